
pub const MEMORY_LABEL: &str = "Memory Results:";
pub const WEB_LABEL: &str = "Web Results:";
pub const NO_LOCAL_RESULTS: &str = "(no local results found)";
pub const NO_WEB_RESULTS: &str = "(no web results found)";

/// Merge memory results and optional web snippets into one labelled block of at
/// most `max_chars` characters.
///
/// When over budget the web body is cut from its end first, then the memory
/// body. Labels are never cut, so a budget smaller than the labels themselves
/// yields just the labels.
#[inline]
pub fn assemble(memory_results: &[String], web_snippets: Option<&[String]>, max_chars: usize) -> String {
    let memory_head = format!("{MEMORY_LABEL}\n");
    let mut memory_body = if memory_results.is_empty() {
        NO_LOCAL_RESULTS.to_string()
    } else {
        memory_results.join("\n")
    };

    let web_head = format!("\n\n{WEB_LABEL}\n");
    let mut web_body = web_snippets.map(|snippets| {
        if snippets.is_empty() {
            NO_WEB_RESULTS.to_string()
        } else {
            snippets.join("\n")
        }
    });

    let fixed = memory_head.chars().count()
        + web_body
            .as_ref()
            .map_or(0, |_| web_head.chars().count());
    let memory_len = memory_body.chars().count();
    let web_len = web_body.as_deref().map_or(0, |body| body.chars().count());

    let mut overflow = (fixed + memory_len + web_len).saturating_sub(max_chars);
    if overflow > 0 {
        if let Some(body) = web_body.as_mut() {
            let cut = overflow.min(web_len);
            *body = keep_chars(body, web_len - cut);
            overflow -= cut;
        }
        let cut = overflow.min(memory_len);
        memory_body = keep_chars(&memory_body, memory_len - cut);
    }

    let mut block = memory_head;
    block.push_str(&memory_body);
    if let Some(body) = web_body {
        block.push_str(&web_head);
        block.push_str(&body);
    }
    block
}

fn keep_chars(text: &str, count: usize) -> String {
    text.chars().take(count).collect()
}
