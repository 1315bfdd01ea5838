//! Generation request passed through the handler lifecycle.

use indexmap::IndexMap;

/// The request-visible state handlers may read and mutate.
///
/// The surrounding generation pipeline owns this value; handlers only see it
/// during `activate` and `deactivate`. Every field is defined at construction,
/// so handlers never need to probe for presence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationRequest {
    /// All prompts of the job. Handlers may append directive text here so the
    /// recorded prompts reflect injected items.
    pub all_prompts: Vec<String>,
    /// Prompts of the current batch.
    pub prompts: Vec<String>,
    /// Seeds of the current batch.
    pub seeds: Vec<u64>,
    /// Variation seeds of the current batch.
    pub subseeds: Vec<u64>,
    /// Index of the current batch within the job.
    pub iteration: usize,
    /// Generation parameter annotations recorded alongside the output.
    pub extra_generation_params: IndexMap<String, String>,
    /// Diagnostic comments shown to the user.
    pub comments: Vec<String>,
    /// True for a second processing stage over the same image.
    pub is_continuation: bool,
    /// Short hashes of loaded networks keyed by sanitized mention name.
    ///
    /// Kept across continuation passes of the same image.
    pub network_hashes: IndexMap<String, String>,
}

impl GenerationRequest {
    /// Create a request for a single batch of prompts.
    #[must_use]
    pub fn new(prompts: Vec<String>) -> Self {
        Self {
            all_prompts: prompts.clone(),
            prompts,
            ..Default::default()
        }
    }

    /// Set the seeds of the current batch.
    #[must_use]
    pub fn with_seeds(mut self, seeds: Vec<u64>) -> Self {
        self.seeds = seeds;
        self
    }

    /// Mark the request as a continuation pass of the same image.
    #[must_use]
    pub fn with_continuation(mut self, is_continuation: bool) -> Self {
        self.is_continuation = is_continuation;
        self
    }

    /// Add a diagnostic comment. Identical comments are recorded once.
    pub fn comment(&mut self, text: impl Into<String>) {
        let text = text.into();
        if !self.comments.contains(&text) {
            self.comments.push(text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_copies_prompts() {
        let request = GenerationRequest::new(vec!["a".to_owned(), "b".to_owned()]);
        assert_eq!(request.all_prompts, request.prompts);
        assert!(!request.is_continuation);
        assert!(request.network_hashes.is_empty());
    }

    #[test]
    fn test_comment_deduplicates() {
        let mut request = GenerationRequest::default();
        request.comment("one");
        request.comment("two");
        request.comment("one");
        assert_eq!(request.comments, ["one", "two"]);
    }
}
