/// What the model is told to say when the context does not hold the answer.
pub const FALLBACK_ANSWER: &str = "I don't know";

/// Fills the fixed grounding template with the retrieved context and the question.
pub fn build_prompt(context: &[String], question: &str) -> String {
    let context = context.join("\n");
    format!(
        "You are a sports analytics assistant. Answer the question using ONLY the context below. \
If the answer is not present, say \"{FALLBACK_ANSWER}\".\n\n\
Context:\n{context}\n\n\
Question:\n{question}\n\n\
Answer:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn prompt_has_fixed_layout() {
        let prompt = build_prompt(
            &["the lakers won.".to_string(), "the celtics lost.".to_string()],
            "Who won?",
        );

        assert!(prompt.starts_with("You are a sports analytics assistant."));
        assert!(prompt.contains("say \"I don't know\""));
        assert!(prompt.contains("Context:\nthe lakers won.\nthe celtics lost.\n\nQuestion:\nWho won?"));
        assert!(prompt.ends_with("Answer:"));
    }

    #[test]
    fn empty_context_still_asks_the_question() {
        let prompt = build_prompt(&[], "Who won?");
        assert!(prompt.contains("Context:\n\n\nQuestion:\nWho won?"));
    }

    proptest! {
        #[test]
        fn prompt_contains_question_and_every_context(
            question in ".{0,40}",
            context in proptest::collection::vec(".{0,40}", 0..5),
        ) {
            let prompt = build_prompt(&context, &question);
            prop_assert!(prompt.contains(&question));
            for passage in &context {
                prop_assert!(prompt.contains(passage.as_str()));
            }
        }
    }
}
