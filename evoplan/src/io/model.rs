//! Model-calling seam.
//!
//! The [`ModelClient`] trait decouples orchestration from whichever language
//! model backend the caller wires in. The CLI uses [`ReplayModel`] to feed
//! recorded responses; tests use scripted clients.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tracing::debug;

/// Prompt text in, response text out.
pub trait ModelClient {
    fn complete(&self, prompt: &str) -> Result<String>;

    /// One independent result per prompt, in prompt order.
    fn complete_batch(&self, prompts: &[String]) -> Vec<Result<String>> {
        prompts.iter().map(|prompt| self.complete(prompt)).collect()
    }
}

impl<M: ModelClient + ?Sized> ModelClient for &M {
    fn complete(&self, prompt: &str) -> Result<String> {
        (**self).complete(prompt)
    }

    fn complete_batch(&self, prompts: &[String]) -> Vec<Result<String>> {
        (**self).complete_batch(prompts)
    }
}

/// Replays recorded responses in order, ignoring the prompt.
#[derive(Debug, Default)]
pub struct ReplayModel {
    responses: RefCell<VecDeque<String>>,
    served: Cell<usize>,
}

impl ReplayModel {
    pub fn new(responses: impl IntoIterator<Item = String>) -> Self {
        Self {
            responses: RefCell::new(responses.into_iter().collect()),
            served: Cell::new(0),
        }
    }

    /// Load one response per file.
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let responses = paths
            .iter()
            .map(|path| {
                let path = path.as_ref();
                fs::read_to_string(path)
                    .with_context(|| format!("read recorded response {}", path.display()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(responses))
    }

    pub fn remaining(&self) -> usize {
        self.responses.borrow().len()
    }
}

impl ModelClient for ReplayModel {
    fn complete(&self, prompt: &str) -> Result<String> {
        let next = self.responses.borrow_mut().pop_front();
        match next {
            Some(response) => {
                let served = self.served.get() + 1;
                self.served.set(served);
                debug!(
                    served,
                    prompt_bytes = prompt.len(),
                    "replayed response"
                );
                Ok(response)
            }
            None => Err(anyhow!(
                "no recorded response left after {} replayed",
                self.served.get()
            )),
        }
    }
}
