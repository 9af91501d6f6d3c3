use std::collections::HashMap;

use super::marker::{self, Marker, MarkerKind};
use crate::evaluator::IntentState;

/// Turns one decoded marker into presentation output. Adapters may keep state
/// across markers of a document.
pub trait MarkerAdapter: Send {
    fn render(&mut self, marker: &Marker) -> String;
}

impl<F> MarkerAdapter for F
where
    F: FnMut(&Marker) -> String + Send,
{
    fn render(&mut self, marker: &Marker) -> String {
        self(marker)
    }
}

/// Dispatches markers to the adapter registered for their kind.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<MarkerKind, Box<dyn MarkerAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Terminal-friendly adapters for every marker kind.
    pub fn plain_text(intents: HashMap<String, IntentState>) -> Self {
        let mut registry = Self::new();
        registry.register(MarkerKind::IntentButton, IntentButtonText::new(intents));
        registry.register(MarkerKind::DefineInput, DefineInputText);
        registry.register(MarkerKind::AiSpeech, SpeechText);
        registry
    }

    pub fn register(&mut self, kind: MarkerKind, adapter: impl MarkerAdapter + 'static) {
        self.adapters.insert(kind, Box::new(adapter));
    }

    pub fn dispatch(&mut self, marker: &Marker) -> Option<String> {
        self.adapters
            .get_mut(&marker.kind())
            .map(|adapter| adapter.render(marker))
    }

    /// Replaces every marker that has an adapter. Markers without one, and
    /// anything that is not a well-formed marker, are left untouched.
    pub fn render(&mut self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for located in marker::scan(text) {
            if let Some(rendered) = self.dispatch(&located.marker) {
                out.push_str(&text[last..located.range.start]);
                out.push_str(&rendered);
                last = located.range.end;
            }
        }
        out.push_str(&text[last..]);
        out
    }
}

/// Shows an intent as a bracketed button followed by its latest outcome.
pub struct IntentButtonText {
    states: HashMap<String, IntentState>,
}

impl IntentButtonText {
    pub fn new(states: HashMap<String, IntentState>) -> Self {
        Self { states }
    }
}

impl MarkerAdapter for IntentButtonText {
    fn render(&mut self, marker: &Marker) -> String {
        let Marker::IntentButton {
            key, button_text, ..
        } = marker
        else {
            return String::new();
        };
        match self.states.get(key) {
            Some(IntentState::Loading) => format!("[{button_text}] (running...)"),
            Some(IntentState::Success { response }) => format!("[{button_text}]\n\n{response}"),
            Some(IntentState::Failure { error }) => format!("[{button_text}] ⚠️ {error}"),
            Some(IntentState::Idle) | None => format!("[{button_text}]"),
        }
    }
}

pub struct DefineInputText;

impl MarkerAdapter for DefineInputText {
    fn render(&mut self, marker: &Marker) -> String {
        match marker {
            Marker::DefineInput {
                name, label, value, ..
            } => format!("{label} ({name}): {value}"),
            _ => String::new(),
        }
    }
}

pub struct SpeechText;

impl MarkerAdapter for SpeechText {
    fn render(&mut self, marker: &Marker) -> String {
        match marker {
            Marker::AiSpeech { agent, audio, .. } if audio.starts_with("data:") => {
                format!("🎤 **{agent}**: [embedded audio]")
            }
            Marker::AiSpeech { agent, audio, .. } => format!("🎤 **{agent}**: {audio}"),
            _ => String::new(),
        }
    }
}
