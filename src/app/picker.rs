//! Selection of one candidate out of many (accounts, roles).
//!
//! [`DialoguerPicker`] is the interactive terminal picker. [`ScriptedPicker`]
//! answers from a queue and never touches the terminal, for automation and tests.

use dialoguer::theme::ColorfulTheme;
use dialoguer::FuzzySelect;
use std::cell::RefCell;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Chooses at most one entry from a list of candidate labels.
pub trait Picker {
    /// Returns the index of the chosen candidate, or `None` when the user
    /// dismissed the picker.
    fn choose_one(&self, prompt: &str, candidates: &[String]) -> Option<usize>;
}

/// Fuzzy-filterable terminal list. `Esc` or `q` cancels.
#[derive(Debug, Default)]
pub struct DialoguerPicker;

impl Picker for DialoguerPicker {
    fn choose_one(&self, prompt: &str, candidates: &[String]) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }

        match FuzzySelect::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .items(candidates)
            .default(0)
            .interact_opt()
        {
            Ok(selection) => selection,
            Err(e) => {
                warn!("Interactive selection failed: {}", e);
                None
            }
        }
    }
}

/// Non-interactive picker that replays a fixed list of answers.
///
/// Once the script is exhausted every further prompt is treated as cancelled.
/// Prompts are recorded so callers can check which selections were asked for.
#[derive(Debug, Default)]
pub struct ScriptedPicker {
    answers: RefCell<VecDeque<Option<usize>>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedPicker {
    pub fn new(answers: impl IntoIterator<Item = Option<usize>>) -> Self {
        Self {
            answers: RefCell::new(answers.into_iter().collect()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    /// A picker that cancels every prompt.
    pub fn cancelling() -> Self {
        Self::default()
    }

    /// Prompts shown so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl Picker for ScriptedPicker {
    fn choose_one(&self, prompt: &str, candidates: &[String]) -> Option<usize> {
        self.prompts.borrow_mut().push(prompt.to_string());
        let answer = self.answers.borrow_mut().pop_front().flatten();
        debug!("Scripted answer for '{}': {:?}", prompt, answer);
        answer.filter(|index| *index < candidates.len())
    }
}
