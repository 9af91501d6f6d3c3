//! # Session
//!
//! One open document together with its evaluator. All mutations arrive as
//! [`SessionEvent`]s or through the matching methods:
//!
//! - **Edit**: the text is re-parsed. When exactly one content block changed
//!   and the block structure is otherwise intact, entries of the untouched
//!   blocks survive; anything else resets the session.
//! - **SetVariable**: a `~define` override changes and the calls whose prompts
//!   reference the variable are regenerated. Nothing else is touched.
//! - **TriggerIntent**: runs an intent call on demand.
//! - **MoveBlock**: reorders blocks. Identity keys carry block positions, so
//!   this always resets.
//!
//! Dropping a session aborts its in-flight generation.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    context::SessionContext,
    definitions::DefinitionSet,
    document::{BlockChange, Document},
    evaluator::{Evaluator, IntentState},
    extractor::{CallDescriptor, CallKind},
    render::{AdapterRegistry, Renderer},
    substitution::Overrides,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("unknown variable input: {0}")]
    UnknownSlot(String),
    #[error("unknown call: {0}")]
    UnknownCall(String),
    #[error("{0} is not an intent call")]
    NotAnIntent(String),
    #[error("block index {index} out of range for {len} blocks")]
    BlockOutOfRange { index: usize, len: usize },
}

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    Edit { text: String },
    SetVariable { key: String, value: String },
    TriggerIntent { key: String },
    MoveBlock { from: usize, to: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    Unchanged,
    /// Only the block at this index was re-evaluated.
    Incremental(usize),
    Reset,
}

pub struct Session {
    document: Document,
    overrides: Overrides,
    calls: Vec<CallDescriptor>,
    evaluator: Evaluator,
}

impl Session {
    pub fn new(context: SessionContext, text: impl Into<String>) -> Self {
        Self::with_previews(context, text, BTreeMap::new())
    }

    /// Opens a session whose Ready values are seeded from a saved snapshot.
    /// Seeded keys are not requested again.
    pub fn with_previews(
        context: SessionContext,
        text: impl Into<String>,
        previews: BTreeMap<String, String>,
    ) -> Self {
        Self::restore(context, text, previews, Overrides::new())
    }

    /// Opens a session with saved previews and `~define` overrides applied
    /// before the first evaluation.
    pub fn restore(
        context: SessionContext,
        text: impl Into<String>,
        previews: BTreeMap<String, String>,
        overrides: Overrides,
    ) -> Self {
        let evaluator = Evaluator::new(context);
        evaluator.preload(previews);
        let mut session = Self {
            document: Document::parse(text),
            overrides,
            calls: Vec::new(),
            evaluator,
        };
        info!(
            session = %session.evaluator.context().id,
            blocks = session.document.blocks().len(),
            "session opened"
        );
        session.evaluate();
        session
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn definitions(&self) -> &DefinitionSet {
        self.document.definitions()
    }

    pub fn overrides(&self) -> &Overrides {
        &self.overrides
    }

    pub fn calls(&self) -> &[CallDescriptor] {
        &self.calls
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Re-extracts calls and makes sure every eager one has an entry.
    pub fn evaluate(&mut self) {
        self.evaluator
            .set_services(self.document.definitions().external_services());
        self.calls = self.document.calls(&self.overrides);
        for call in &self.calls {
            self.evaluator.ensure(call);
        }
        debug!(calls = self.calls.len(), "evaluated document");
    }

    pub fn apply(&mut self, event: SessionEvent) -> SessionResult<()> {
        match event {
            SessionEvent::Edit { text } => {
                self.edit(text);
            }
            SessionEvent::SetVariable { key, value } => {
                self.set_variable(&key, value)?;
            }
            SessionEvent::TriggerIntent { key } => {
                self.trigger_intent(&key)?;
            }
            SessionEvent::MoveBlock { from, to } => self.move_block(from, to)?,
        }
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub fn edit(&mut self, text: impl Into<String>) -> EditOutcome {
        let text = text.into();
        if text == self.document.text() {
            return EditOutcome::Unchanged;
        }
        let next = Document::parse(text);
        let change = next.change_from(&self.document);
        self.document = next;

        let outcome = match change {
            BlockChange::None => EditOutcome::Unchanged,
            BlockChange::Single(index) => {
                let keys: HashSet<String> = self
                    .document
                    .calls(&self.overrides)
                    .into_iter()
                    .map(|call| call.identity_key)
                    .collect();
                self.evaluator.retain(&keys);
                EditOutcome::Incremental(index)
            }
            BlockChange::Structural => {
                self.evaluator.reset();
                EditOutcome::Reset
            }
        };
        self.evaluate();
        debug!(?outcome, "applied edit");
        outcome
    }

    /// Sets a `~define` override and regenerates the calls that reference the
    /// variable. Returns the rescheduled keys.
    #[tracing::instrument(level = "debug", skip(self, value))]
    pub fn set_variable(&mut self, key: &str, value: impl Into<String>) -> SessionResult<Vec<String>> {
        let name = self
            .document
            .slot(key)
            .map(|slot| slot.name.clone())
            .ok_or_else(|| SessionError::UnknownSlot(key.to_string()))?;
        self.overrides.insert(key.to_string(), value.into());

        let substitution = self.document.substitution(&self.overrides);
        let rescheduled = self.evaluator.invalidate(&name, &substitution);
        self.calls = self.document.calls(&self.overrides);
        Ok(rescheduled)
    }

    /// Returns `false` when the intent is already loading.
    pub fn trigger_intent(&mut self, key: &str) -> SessionResult<bool> {
        let call = self
            .calls
            .iter()
            .find(|call| call.identity_key == key)
            .ok_or_else(|| SessionError::UnknownCall(key.to_string()))?;
        if call.kind != CallKind::Intent {
            return Err(SessionError::NotAnIntent(key.to_string()));
        }
        Ok(self.evaluator.trigger_intent(call))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn move_block(&mut self, from: usize, to: usize) -> SessionResult<()> {
        let len = self.document.blocks().len();
        let moved = self.document.move_block(from, to).ok_or_else(|| {
            SessionError::BlockOutOfRange {
                index: from.max(to),
                len,
            }
        })?;
        self.document = moved;
        self.evaluator.reset();
        self.evaluate();
        Ok(())
    }

    /// Processed Markdown for a render adapter.
    pub fn render(&self) -> String {
        let substitution = self.document.substitution(&self.overrides);
        Renderer::new(&substitution, &self.evaluator).render(self.document.blocks())
    }

    pub fn render_with(&self, registry: &mut AdapterRegistry) -> String {
        registry.render(&self.render())
    }

    pub fn intent_states(&self) -> HashMap<String, IntentState> {
        self.calls
            .iter()
            .filter(|call| call.kind == CallKind::Intent)
            .map(|call| {
                (
                    call.identity_key.clone(),
                    self.evaluator.intent_state(&call.identity_key),
                )
            })
            .collect()
    }

    /// Ready values, suitable for [`Session::with_previews`].
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.evaluator.snapshot()
    }

    pub async fn settled(&self) {
        self.evaluator.settled().await;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.evaluator.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::SessionConfig,
        evaluator::CacheStatus,
        generation::{EchoGenerator, GenerationOutput, Generator, MockGenerator},
    };
    use pretty_assertions::assert_eq;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    const DOC: &str = "\
:::
@define[Wallet](ABC)
:::

~define[Wallet](Your wallet)

~ai[A](Balance of {Wallet})

~ai[B](static)

~intent[T](<Go>, go for {Wallet})";

    fn context(generator: impl Generator + 'static) -> SessionContext {
        SessionContext::new(Arc::new(generator), SessionConfig::default())
    }

    fn counting() -> (MockGenerator, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let mut generator = MockGenerator::new();
        generator.expect_generate().returning(move |request| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(GenerationOutput::Content(format!("ok {}", request.prompt)))
        });
        (generator, count)
    }

    #[tokio::test]
    async fn test_open_evaluates_eager_calls() {
        let session = Session::new(context(EchoGenerator::default()), DOC);
        session.settled().await;
        let rendered = session.render();
        assert!(rendered.contains("A: Balance of ABC"));
        assert!(rendered.contains("B: static"));
        assert_eq!(
            session.snapshot().keys().collect::<Vec<_>>(),
            vec!["2:A:Balance of {Wallet}", "3:B:static"]
        );
    }

    #[tokio::test]
    async fn test_set_variable_regenerates_dependents_only() {
        let (generator, count) = counting();
        let mut session = Session::new(context(generator), DOC);
        session.settled().await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        let rescheduled = session.set_variable("define:1:Wallet", "XYZ").unwrap();
        assert_eq!(rescheduled, vec!["2:A:Balance of {Wallet}"]);
        session.settled().await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(
            session.evaluator().entry("2:A:Balance of {Wallet}").unwrap().value.as_deref(),
            Some("ok Balance of XYZ")
        );

        assert_eq!(
            session.set_variable("define:9:Nope", "x"),
            Err(SessionError::UnknownSlot("define:9:Nope".into()))
        );
    }

    #[tokio::test]
    async fn test_single_block_edit_keeps_other_entries() {
        let (generator, count) = counting();
        let mut session = Session::new(context(generator), DOC);
        session.settled().await;

        let outcome = session.edit(DOC.replace("static", "changed"));
        assert_eq!(outcome, EditOutcome::Incremental(3));
        session.settled().await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(session.evaluator().entry("3:B:static").is_none());
        assert!(session.evaluator().entry("3:B:changed").unwrap().is_ready());
        assert!(session
            .evaluator()
            .entry("2:A:Balance of {Wallet}")
            .unwrap()
            .is_ready());

        assert_eq!(session.edit(session.document().text().to_string()), EditOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_structural_edit_resets() {
        let (generator, count) = counting();
        let mut session = Session::new(context(generator), DOC);
        session.settled().await;

        let outcome = session.edit(format!("Intro\n\n{DOC}"));
        assert_eq!(outcome, EditOutcome::Reset);
        session.settled().await;
        assert_eq!(count.load(Ordering::SeqCst), 4);
        assert!(session.evaluator().entry("3:A:Balance of {Wallet}").unwrap().is_ready());
    }

    #[tokio::test]
    async fn test_move_block() {
        let mut session = Session::new(context(EchoGenerator::default()), DOC);
        session.settled().await;
        session.apply(SessionEvent::MoveBlock { from: 3, to: 2 }).unwrap();
        session.settled().await;
        assert_eq!(
            session.snapshot().keys().collect::<Vec<_>>(),
            vec!["2:B:static", "3:A:Balance of {Wallet}"]
        );
        assert_eq!(
            session.move_block(0, 9),
            Err(SessionError::BlockOutOfRange { index: 9, len: 5 })
        );
    }

    #[tokio::test]
    async fn test_trigger_intent() {
        let mut session = Session::new(context(EchoGenerator::default()), DOC);
        let key = "intent:4:T:go for {Wallet}";
        assert_eq!(session.evaluator().intent_state(key), IntentState::Idle);
        assert!(session.trigger_intent(key).unwrap());
        session.settled().await;
        assert_eq!(
            session.evaluator().intent_state(key),
            IntentState::Success {
                response: "T: go for ABC".into()
            }
        );

        let mut registry = AdapterRegistry::plain_text(session.intent_states());
        let rendered = session.render_with(&mut registry);
        assert!(rendered.contains("[Go]\n\nT: go for ABC"));
        assert!(rendered.contains("Your wallet (Wallet): ABC"));

        assert_eq!(
            session.trigger_intent("3:B:static"),
            Err(SessionError::NotAnIntent("3:B:static".into()))
        );
        assert_eq!(
            session.trigger_intent("missing"),
            Err(SessionError::UnknownCall("missing".into()))
        );
    }

    #[tokio::test]
    async fn test_previews_are_not_requested() {
        let (generator, count) = counting();
        let previews = BTreeMap::from([
            ("2:A:Balance of {Wallet}".to_string(), "saved".to_string()),
            ("3:B:static".to_string(), "saved too".to_string()),
        ]);
        let session = Session::with_previews(context(generator), DOC, previews);
        session.settled().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(session.render().contains("saved too"));
    }

    #[test]
    fn test_offline_session_stays_pending() {
        let session = Session::new(
            SessionContext::new(Arc::new(EchoGenerator::default()), SessionConfig::offline()),
            DOC,
        );
        assert!(session.render().contains("🤖 **A**: thinking…"));
        assert_eq!(
            session.evaluator().entry("3:B:static").map(|e| e.status),
            Some(CacheStatus::Pending)
        );
    }

    #[test]
    fn test_event_wire_format() {
        let event: SessionEvent =
            serde_json::from_str(r#"{"type":"setVariable","key":"define:1:Wallet","value":"X"}"#)
                .unwrap();
        assert_eq!(
            event,
            SessionEvent::SetVariable {
                key: "define:1:Wallet".into(),
                value: "X".into()
            }
        );
    }
}
