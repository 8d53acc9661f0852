
use tracing::{debug, info, warn};

use crate::cache::ContextCache;
use crate::config::Config;
use crate::context;
use crate::embeddings::EmbeddingProvider;
use crate::retrieval::{Retriever, RetrievalConfig, SearchHit};
use crate::store::StoreManager;
use crate::web::SearchProvider;
use crate::{Result, YoError};

/// Prompt in, response out.
pub trait Generator {
    fn generate(&self, prompt: &str) -> anyhow::Result<String>;
}

impl<T: Generator + ?Sized> Generator for &T {
    #[inline]
    fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        (**self).generate(prompt)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub context: String,
    pub hits: Vec<SearchHit>,
    pub web_snippets: Option<Vec<String>>,
    /// Whether the web snippets came from the cache
    pub web_from_cache: bool,
}

/// Builds the generation prompt around an assembled context block.
#[inline]
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "You are Yo, a local second brain. Answer the question using the context below. \
         If the context does not contain the answer, say so.\n\n{context}\n\nQuestion: {question}\nAnswer:"
    )
}

/// Answers questions from a namespace, optionally blending in web snippets.
pub struct Assistant<'a, E: EmbeddingProvider, G: Generator> {
    retriever: Retriever<'a, E>,
    generator: G,
    cache: ContextCache,
    retrieval: RetrievalConfig,
}

impl<'a, E: EmbeddingProvider, G: Generator> Assistant<'a, E, G> {
    #[inline]
    pub fn new(store: &'a StoreManager, embedder: E, generator: G, config: &Config) -> Self {
        Self {
            retriever: Retriever::new(store, embedder, config),
            generator,
            cache: ContextCache::from_config(config),
            retrieval: config.retrieval.clone(),
        }
    }

    #[inline]
    pub fn with_cache(mut self, cache: ContextCache) -> Self {
        self.cache = cache;
        self
    }

    /// Web snippets for `question`: cached when fresh, otherwise fetched and cached.
    ///
    /// # Returns
    /// * `Option<(Vec<String>, bool)>` - Snippets and whether they were cached, `None` if the fetch failed
    pub fn web_context(
        &self,
        question: &str,
        provider: &dyn SearchProvider,
    ) -> Option<(Vec<String>, bool)> {
        if let Some(snippets) = self.cache.get(question) {
            debug!("Using cached web snippets for {:?}", question);
            return Some((snippets, true));
        }

        match provider.fetch(question) {
            Ok(snippets) => {
                if let Err(e) = self.cache.put(question, snippets.clone()) {
                    warn!("Failed to cache web snippets: {}", e);
                }
                Some((snippets, false))
            }
            Err(e) => {
                warn!("Web search failed, answering from memory only: {:#}", e);
                None
            }
        }
    }

    /// Retrieve, assemble and generate an answer to `question`.
    ///
    /// A namespace that was never ingested answers from an empty memory section.
    pub async fn ask(
        &self,
        namespace: &str,
        question: &str,
        web: Option<&dyn SearchProvider>,
    ) -> Result<Answer> {
        let hits = match self
            .retriever
            .search(namespace, question, self.retrieval.top_k)
            .await
        {
            Ok(hits) => hits,
            Err(YoError::NamespaceNotFound(name)) => {
                warn!("Namespace '{}' has no documents yet", name);
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        let memory: Vec<String> = hits.iter().map(|hit| hit.text.clone()).collect();

        let web_result = web.and_then(|provider| self.web_context(question, provider));
        let (web_snippets, web_from_cache) = match web_result {
            Some((snippets, cached)) => (Some(snippets), cached),
            None => (None, false),
        };

        let context = context::assemble(
            &memory,
            web_snippets.as_deref(),
            self.retrieval.max_context_chars,
        );
        let prompt = build_prompt(&context, question);
        let text = self
            .generator
            .generate(&prompt)
            .map_err(|e| YoError::Network(format!("Generation failed: {e:#}")))?;

        info!(
            "Answered question in '{}' using {} memory hits{}",
            namespace,
            hits.len(),
            if web_snippets.is_some() { " and web context" } else { "" }
        );
        Ok(Answer {
            text,
            context,
            hits,
            web_snippets,
            web_from_cache,
        })
    }
}
