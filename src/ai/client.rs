// client.rs — Wraps one provider call and turns whatever comes back into an
// `InferenceOutcome`. All of the letter-picking rules live here.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{
    InferenceError, InferenceOutcome, InferenceProvider, InferenceRequest, NoAnswerReason,
    ProviderResponse, Symbol,
};
use crate::capture::CapturedImage;

/// What the model is told to answer when it cannot read or solve the question.
pub const DECLINE_SENTINEL: &str = "ERROR";

/// Sampling temperature for every request. Fixed so the same screen gets
/// the same answer.
pub const TEMPERATURE: f32 = 0.0;

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub timeout: Duration,
    /// Wider captures are downscaled before upload. 0 disables downscaling.
    pub max_image_width: u32,
    pub jpeg_quality: u8,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(90),
            max_image_width: 2048,
            jpeg_quality: 85,
        }
    }
}

pub struct InferenceClient {
    provider: Arc<dyn InferenceProvider>,
    alphabet: Vec<Symbol>,
    instruction: String,
    options: ClientOptions,
}

impl InferenceClient {
    pub fn new(
        provider: Arc<dyn InferenceProvider>,
        alphabet: Vec<Symbol>,
        options: ClientOptions,
    ) -> Self {
        let instruction = build_instruction(&alphabet);
        Self {
            provider,
            alphabet,
            instruction,
            options,
        }
    }

    pub fn alphabet(&self) -> &[Symbol] {
        &self.alphabet
    }

    /// Encode the capture, ask the provider, normalize the reply.
    /// Never panics and never retries; every failure comes back as
    /// `InferenceOutcome::Error`.
    pub async fn classify(&self, image: &CapturedImage) -> InferenceOutcome {
        let image_base64 =
            match image.to_jpeg_base64(self.options.max_image_width, self.options.jpeg_quality) {
                Ok(b64) => b64,
                Err(e) => return InferenceOutcome::Error(InferenceError::ImageEncoding(e.to_string())),
            };

        let request = InferenceRequest {
            instruction: self.instruction.clone(),
            image_base64,
            mime_type: "image/jpeg",
            temperature: TEMPERATURE,
            timeout: self.options.timeout,
        };

        log::info!(
            "Asking {} to read the capture ({}x{})",
            self.provider.name(),
            image.width(),
            image.height()
        );
        let start = Instant::now();
        let reply = match tokio::time::timeout(self.options.timeout, self.provider.generate(&request))
            .await
        {
            Ok(reply) => reply,
            Err(_) => Err(InferenceError::Timeout(self.options.timeout)),
        };
        log::info!("Provider replied in {}ms", start.elapsed().as_millis());

        match reply {
            Ok(response) => normalize_response(&response, &self.alphabet),
            Err(e) => InferenceOutcome::Error(e),
        }
    }
}

/// Instruction sent with every capture. Lists the letters the model may use.
pub fn build_instruction(alphabet: &[Symbol]) -> String {
    let letters = alphabet
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "You are an expert assistant. The image contains a multiple-choice question.\n\
         1. Read the question and all of its answer options directly from the image.\n\
         2. Use your own knowledge of the subject to pick the single best option.\n\
         3. Respond ONLY with the capital letter of that option (one of: {letters}).\n\
         If you cannot read the question or options, or cannot determine the answer, \
         respond ONLY with the single word: {DECLINE_SENTINEL}.\n\
         Do not add any explanation or extra text."
    )
}

/// Pick the text out of the provider reply and hand it to [`normalize_text`].
/// No candidates at all means the prompt was blocked.
pub fn normalize_response(response: &ProviderResponse, alphabet: &[Symbol]) -> InferenceOutcome {
    let Some(candidate) = response.candidates.first() else {
        return InferenceOutcome::Error(InferenceError::Blocked {
            reason: response.block_reason.clone(),
        });
    };

    match candidate.text() {
        Some(raw) => normalize_text(&raw, alphabet),
        None => InferenceOutcome::Error(InferenceError::ExtractionFailed(format!(
            "candidate has no text (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        ))),
    }
}

/// Precedence: exact letter, decline sentinel, single-letter scan, ambiguous.
///
/// The scan first looks for exactly one alphabet character anywhere in the
/// text. Failing that it looks for exactly one standalone one-letter word
/// from the alphabet, so "The answer is B." still reads as B even though
/// "THE ANSWER" contributes stray alphabet characters.
pub fn normalize_text(raw: &str, alphabet: &[Symbol]) -> InferenceOutcome {
    let processed = raw.trim().to_uppercase();
    log::info!("Model raw reply: '{}' -> processed: '{}'", raw.trim(), processed);

    let in_alphabet = |c: char| alphabet.iter().any(|s| s.as_char() == c);

    let mut chars = processed.chars();
    if let (Some(only), None) = (chars.next(), chars.next()) {
        if in_alphabet(only) {
            if let Some(symbol) = Symbol::new(only) {
                return InferenceOutcome::Answer(symbol);
            }
        }
    }

    if processed == DECLINE_SENTINEL {
        log::info!("Model declined to answer");
        return InferenceOutcome::NoAnswer(NoAnswerReason::Declined);
    }

    let scattered: Vec<char> = processed.chars().filter(|c| in_alphabet(*c)).collect();
    if let [only] = scattered.as_slice() {
        if let Some(symbol) = Symbol::new(*only) {
            log::warn!("Model added extra text; extracted '{}'", symbol);
            return InferenceOutcome::Answer(symbol);
        }
    }

    let standalone: Vec<char> = processed
        .split(|c: char| !c.is_alphanumeric())
        .filter_map(|word| {
            let mut it = word.chars();
            match (it.next(), it.next()) {
                (Some(c), None) if in_alphabet(c) => Some(c),
                _ => None,
            }
        })
        .collect();
    if let [only] = standalone.as_slice() {
        if let Some(symbol) = Symbol::new(*only) {
            log::warn!("Model added extra text; extracted standalone '{}'", symbol);
            return InferenceOutcome::Answer(symbol);
        }
    }

    log::warn!("Model gave an unusable reply: '{}'", raw.trim());
    InferenceOutcome::NoAnswer(NoAnswerReason::Ambiguous {
        raw: raw.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::Candidate;

    fn alphabet() -> Vec<Symbol> {
        "ABCDEF".chars().filter_map(Symbol::new).collect()
    }

    fn answer_of(outcome: InferenceOutcome) -> Option<char> {
        match outcome {
            InferenceOutcome::Answer(s) => Some(s.as_char()),
            _ => None,
        }
    }

    #[test]
    fn exact_letter_is_an_answer() {
        assert_eq!(answer_of(normalize_text("A", &alphabet())), Some('A'));
        assert_eq!(answer_of(normalize_text("  f\n", &alphabet())), Some('F'));
    }

    #[test]
    fn lower_case_letter_is_an_answer() {
        assert_eq!(answer_of(normalize_text("a", &alphabet())), Some('A'));
    }

    #[test]
    fn sentinel_is_a_decline() {
        assert!(matches!(
            normalize_text("ERROR", &alphabet()),
            InferenceOutcome::NoAnswer(NoAnswerReason::Declined)
        ));
        assert!(matches!(
            normalize_text(" error \n", &alphabet()),
            InferenceOutcome::NoAnswer(NoAnswerReason::Declined)
        ));
    }

    #[test]
    fn single_letter_inside_text_is_extracted() {
        assert_eq!(answer_of(normalize_text("The answer is B.", &alphabet())), Some('B'));
        assert_eq!(answer_of(normalize_text("(D)", &alphabet())), Some('D'));
        assert_eq!(answer_of(normalize_text("Option: c", &alphabet())), Some('C'));
    }

    #[test]
    fn two_letters_are_ambiguous() {
        match normalize_text("AB", &alphabet()) {
            InferenceOutcome::NoAnswer(NoAnswerReason::Ambiguous { raw }) => assert_eq!(raw, "AB"),
            other => panic!("expected ambiguous, got {:?}", other),
        }
        assert!(matches!(
            normalize_text("A or B", &alphabet()),
            InferenceOutcome::NoAnswer(NoAnswerReason::Ambiguous { .. })
        ));
    }

    #[test]
    fn letters_outside_alphabet_are_ignored() {
        assert!(matches!(
            normalize_text("G", &alphabet()),
            InferenceOutcome::NoAnswer(NoAnswerReason::Ambiguous { .. })
        ));
        assert!(matches!(
            normalize_text("", &alphabet()),
            InferenceOutcome::NoAnswer(NoAnswerReason::Ambiguous { .. })
        ));
    }

    #[test]
    fn smaller_alphabet_limits_answers() {
        let abcd: Vec<Symbol> = "ABCD".chars().filter_map(Symbol::new).collect();
        assert_eq!(answer_of(normalize_text("E D", &abcd)), Some('D'));
        assert!(answer_of(normalize_text("E", &abcd)).is_none());
    }

    #[test]
    fn no_candidates_is_blocked() {
        let response = ProviderResponse {
            candidates: vec![],
            block_reason: Some("SAFETY".into()),
        };
        match normalize_response(&response, &alphabet()) {
            InferenceOutcome::Error(InferenceError::Blocked { reason }) => {
                assert_eq!(reason.as_deref(), Some("SAFETY"))
            }
            other => panic!("expected Blocked, got {:?}", other),
        }
        assert!(matches!(
            normalize_response(&ProviderResponse::default(), &alphabet()),
            InferenceOutcome::Error(InferenceError::Blocked { reason: None })
        ));
    }

    #[test]
    fn candidate_without_text_is_extraction_failure() {
        let response = ProviderResponse {
            candidates: vec![Candidate {
                text_parts: vec![],
                finish_reason: Some("SAFETY".into()),
            }],
            block_reason: None,
        };
        assert!(matches!(
            normalize_response(&response, &alphabet()),
            InferenceOutcome::Error(InferenceError::ExtractionFailed(_))
        ));
    }

    #[test]
    fn first_candidate_text_is_normalized() {
        let response = ProviderResponse::from_text("e\n");
        assert_eq!(answer_of(normalize_response(&response, &alphabet())), Some('E'));
    }

    #[test]
    fn instruction_lists_alphabet_and_sentinel() {
        let text = build_instruction(&alphabet());
        assert!(text.contains("A, B, C, D, E, F"));
        assert!(text.contains(DECLINE_SENTINEL));
    }
}
