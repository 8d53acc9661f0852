use super::*;
use crate::YoError;

fn collect(text: &str, size: usize, overlap: usize) -> Vec<&str> {
    chunk(text, size, overlap).expect("valid window").collect()
}

fn reconstruct(windows: &[&str], overlap: usize) -> String {
    let mut text = String::new();
    for (index, window) in windows.iter().enumerate() {
        if index == 0 {
            text.push_str(window);
        } else {
            text.extend(window.chars().skip(overlap));
        }
    }
    text
}

#[test]
fn empty_text_has_no_chunks() {
    assert!(collect("", 800, 100).is_empty());
}

#[test]
fn short_text_is_one_chunk() {
    assert_eq!(
        collect("Yo is a local second brain.", 800, 100),
        vec!["Yo is a local second brain."]
    );
}

#[test]
fn windows_overlap_and_last_is_shorter() {
    assert_eq!(
        collect("0123456789", 4, 1),
        vec!["0123", "3456", "6789"]
    );
    assert_eq!(collect("0123456789a", 4, 1), vec!["0123", "3456", "6789", "9a"]);
}

#[test]
fn exact_fit_has_no_trailing_window() {
    assert_eq!(collect("abcd", 4, 2), vec!["abcd"]);
    assert_eq!(collect("abcdef", 4, 2), vec!["abcd", "cdef"]);
}

#[test]
fn reconstruction_modulo_overlap() {
    let text = "The quick brown fox jumps over the lazy dog. ".repeat(50);
    let windows = collect(&text, 120, 17);
    assert!(windows.iter().all(|w| w.chars().count() <= 120));
    assert_eq!(reconstruct(&windows, 17), text);
}

#[test]
fn counts_characters_not_bytes() {
    let text = "héllo wörld ✓✓✓";
    let windows = collect(text, 5, 2);
    assert_eq!(windows[0], "héllo");
    assert_eq!(windows[1], "lo wö");
    assert_eq!(reconstruct(&windows, 2), text);
}

#[test]
fn chunking_is_deterministic() {
    let text = "lorem ipsum ".repeat(300);
    let first = collect(&text, 800, 100);
    let second = collect(&text, 800, 100);
    assert_eq!(first, second);
}

#[test]
fn iteration_is_lazy() {
    let text = "x".repeat(10_000);
    let mut chunks = chunk(&text, 10, 0).expect("valid window");
    assert_eq!(chunks.next().map(str::len), Some(10));
    assert_eq!(chunks.count(), 999);
}

#[test]
fn overlap_must_be_smaller_than_size() {
    assert!(matches!(chunk("text", 4, 4), Err(YoError::Config(_))));
    assert!(chunk("text", 4, 9).is_err());
}

#[test]
fn config_defaults_drive_chunks() {
    let config = ChunkingConfig::default();
    let text = "a".repeat(1_500);
    let windows: Vec<&str> = config.chunks(&text).expect("valid config").collect();
    assert_eq!(windows.len(), 2);
    assert_eq!(windows[0].len(), 800);
    assert_eq!(windows[1].len(), 800);
}
