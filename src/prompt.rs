//! Prompt construction and selection.
//!
//! Two selection policies coexist, reflecting the system's history:
//!
//! - **grounding** — probe connectivity, decide whether the input needs
//!   factual data, fetch reference text, and build either a grounded
//!   formatter prompt or a generic documentation prompt.
//! - **code-detect** — classify the input as source code via a fixed
//!   indicator list and build either a code-explanation prompt or a tutor
//!   prompt.
//!
//! Both are implemented behind [`PromptSelector`] so the relay never branches
//! on policy; [`create_selector`] picks the implementation from config.
//! Selection is deterministic given the input text and any fetched context,
//! and never fails: absence of signal degrades to the Generic/Tutor template.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::{Config, GroundingConfig};
use crate::grounding;
use crate::models::GroundingContext;
use crate::probe;

/// Substrings that mark an input as likely source code.
const CODE_INDICATORS: &[&str] = &[
    "def ",
    "class ",
    "import ",
    "{",
    "}",
    ";",
    "print(",
    "console.log",
    "function ",
    "#include",
];

/// Case-insensitive substring match against the fixed indicator list.
pub fn looks_like_code(text: &str) -> bool {
    let text = text.to_lowercase();
    CODE_INDICATORS.iter().any(|k| text.contains(k))
}

/// Which of the four fixed templates a prompt was built from.
///
/// The tag is response metadata only (surfaced in the `X-Generation-Mode`
/// header); the relay treats all strategies identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStrategy {
    /// Reorganize fetched reference text without altering factual content.
    Grounded,
    /// Explain a topic conceptually without fabricating statistics.
    Generic,
    /// Explain source code as structured Markdown documentation.
    CodeExplain,
    /// Answer a free-form question as Markdown with examples.
    Tutor,
}

impl PromptStrategy {
    pub fn tag(&self) -> &'static str {
        match self {
            PromptStrategy::Grounded => "grounded",
            PromptStrategy::Generic => "generic",
            PromptStrategy::CodeExplain => "code-explain",
            PromptStrategy::Tutor => "tutor",
        }
    }

    /// Build the prompt string for this strategy.
    pub fn render(&self, input: &str, context: Option<&GroundingContext>) -> String {
        match (self, context) {
            (PromptStrategy::Grounded, Some(context)) => format!(
                "You are a documentation formatter.\n\
                 \n\
                 IMPORTANT RULE:\n\
                 You are NOT allowed to change ANY factual values.\n\
                 Do NOT calculate. Do NOT estimate. Do NOT rephrase numbers.\n\
                 Do NOT summarize statistics.\n\
                 Your job is ONLY to organize the given verified data into clean\n\
                 documentation, copying all numbers EXACTLY as provided.\n\
                 \n\
                 -------------------------------------\n\
                 VERIFIED DATA (IMMUTABLE SOURCE)\n\
                 -------------------------------------\n\
                 {}\n\
                 -------------------------------------\n\
                 \n\
                 TASK:\n\
                 Convert the above information into structured documentation with\n\
                 clear headings, bullet points, and sections. You are formatting,\n\
                 NOT rewriting.\n",
                context.render()
            ),
            (PromptStrategy::Grounded, None) | (PromptStrategy::Generic, _) => format!(
                "You are a professional documentation writer.\n\
                 \n\
                 Explain the topic in a structured documentation style.\n\
                 \n\
                 Rules:\n\
                 - Use headings and sections\n\
                 - Use bullet points where useful\n\
                 - If real-world numbers are unknown, explain conceptually\n\
                 - Do not hallucinate statistics\n\
                 \n\
                 Topic:\n\
                 {}\n",
                input
            ),
            (PromptStrategy::CodeExplain, _) => format!(
                "You are a professional documentation writer.\n\
                 \n\
                 Explain the following source code as structured Markdown\n\
                 documentation: what it does, how it works, and anything a\n\
                 reader should watch out for. Use headings, and put code in\n\
                 fenced code blocks.\n\
                 \n\
                 Code:\n\
                 {}\n",
                input
            ),
            (PromptStrategy::Tutor, _) => format!(
                "You are a patient programming tutor.\n\
                 \n\
                 Answer the following question in Markdown. Explain step by\n\
                 step and include short examples where they help.\n\
                 \n\
                 Question:\n\
                 {}\n",
                input
            ),
        }
    }
}

/// A built prompt plus the strategy tag used for response metadata.
#[derive(Debug, Clone)]
pub struct PromptPlan {
    pub prompt: String,
    pub strategy: PromptStrategy,
}

/// Chooses and builds the prompt for one generation request.
#[async_trait]
pub trait PromptSelector: Send + Sync {
    async fn select(&self, input: &str) -> PromptPlan;
}

/// Grounding-gated selection: fetch reference text when the input asks for
/// factual data and the network is reachable.
pub struct GroundingSelector {
    config: GroundingConfig,
}

impl GroundingSelector {
    pub fn new(config: GroundingConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PromptSelector for GroundingSelector {
    async fn select(&self, input: &str) -> PromptPlan {
        let mut context = None;

        if grounding::needs_factual_context(input) {
            let online = probe::is_online(
                &self.config.probe_addr,
                Duration::from_secs(self.config.probe_timeout_secs),
            )
            .await;
            if online {
                context = grounding::fetch_context(&self.config, input).await;
            }
        }

        let strategy = match context {
            Some(_) => PromptStrategy::Grounded,
            None => PromptStrategy::Generic,
        };
        PromptPlan {
            prompt: strategy.render(input, context.as_ref()),
            strategy,
        }
    }
}

/// Code-classification selection: no network, purely textual.
pub struct CodeDetectSelector;

#[async_trait]
impl PromptSelector for CodeDetectSelector {
    async fn select(&self, input: &str) -> PromptPlan {
        let strategy = if looks_like_code(input) {
            PromptStrategy::CodeExplain
        } else {
            PromptStrategy::Tutor
        };
        PromptPlan {
            prompt: strategy.render(input, None),
            strategy,
        }
    }
}

/// Create the selector named by `[prompting].policy`.
///
/// `load_config` has already validated the policy name.
pub fn create_selector(config: &Config) -> Box<dyn PromptSelector> {
    match config.prompting.policy.as_str() {
        "grounding" => Box::new(GroundingSelector::new(config.grounding.clone())),
        _ => Box::new(CodeDetectSelector),
    }
}
