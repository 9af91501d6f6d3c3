mod common;

use agentmark::{
    definitions::{BoundConfig, CapabilityBinding, DefinitionKind, ServiceRef},
    extractor::CallKind,
    render::{marker, Marker},
    substitution::Overrides,
    Document,
};
use common::PORTFOLIO;
use pretty_assertions::assert_eq;

#[test]
fn test_blocks_and_definitions() {
    let document = Document::parse(PORTFOLIO);
    let blocks = document.blocks();
    assert_eq!(blocks.len(), 8);
    assert!(blocks[1].is_definition);
    assert_eq!(blocks[1].line, 3);
    assert!(blocks[7].text.starts_with("```md"));
    assert_eq!(blocks.iter().filter(|b| b.is_definition).count(), 1);

    let definitions = document.definitions();
    let summary: Vec<_> = definitions
        .iter()
        .map(|d| (d.kind.clone(), d.name.as_str()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (DefinitionKind::Variable, "Wallet"),
            (DefinitionKind::ExternalService, "SolanaMCP"),
            (DefinitionKind::Capability, "Balance"),
            (DefinitionKind::Agent, "Summarizer"),
        ]
    );
    assert_eq!(
        definitions.variable("Wallet").unwrap().description.as_deref(),
        Some("Address to inspect.")
    );
    assert_eq!(
        definitions.agent("summarizer").unwrap().description.as_deref(),
        Some("Summarizes holdings.")
    );
    assert_eq!(
        definitions.external_services(),
        vec![ServiceRef {
            name: "SolanaMCP".into(),
            params: "\"https://mcp.solana.com/mcp\"".into(),
        }]
    );
}

#[test]
fn test_calls_in_document_order() {
    let document = Document::parse(PORTFOLIO);
    let calls = document.calls(&Overrides::new());
    let keys: Vec<_> = calls
        .iter()
        .map(|c| (c.kind, c.identity_key.as_str()))
        .collect();
    assert_eq!(
        keys,
        vec![
            (CallKind::VariableInput, "define:2:Wallet"),
            (CallKind::Text, "3:Summarizer:Balance of {Wallet}"),
            (CallKind::Image, "image:4:Painter:a chart of {Wallet}"),
            (CallKind::Speech, "speech:5:Narrator:Read the summary"),
            (CallKind::Intent, "intent:6:Summarizer:Refresh {Wallet} now"),
            (CallKind::Text, "7:Ghost:inside a code fence"),
        ]
    );

    let summarizer = &calls[1];
    assert_eq!(summarizer.prompt, "Balance of ABC123");
    assert_eq!(
        summarizer.bound_config,
        Some(BoundConfig {
            variable_defaults: "\"gpt-4o-mini\"".into(),
            capability: Some(CapabilityBinding {
                name: "Balance".into(),
                params: "address: String".into(),
            }),
        })
    );
    assert_eq!(calls[2].bound_config, None);
    assert_eq!(calls[4].label.as_deref(), Some("Refresh"));
}

#[test]
fn test_overrides_change_prompts_not_keys() {
    let document = Document::parse(PORTFOLIO);
    let before = document.calls(&Overrides::new());
    let overrides = Overrides::from([("define:2:Wallet".to_string(), "XYZ789".to_string())]);
    let after = document.calls(&overrides);

    assert_eq!(before.len(), after.len());
    for (a, b) in before.iter().zip(&after) {
        assert_eq!(a.identity_key, b.identity_key);
    }
    assert_eq!(after[1].prompt, "Balance of XYZ789");
    assert_eq!(after[2].prompt, "a chart of XYZ789");
    assert_eq!(after[4].prompt, "Refresh XYZ789 now");
}

#[test]
fn test_render_before_generation() {
    let document = Document::parse(PORTFOLIO);
    let overrides = Overrides::new();
    let substitution = document.substitution(&overrides);
    let previews = std::collections::HashMap::<String, String>::new();
    let rendered = agentmark::render::Renderer::new(&substitution, &previews)
        .render(document.blocks());

    assert!(rendered.starts_with("# Portfolio\n\nWallet: \n<define-input"));
    assert!(!rendered.contains(":::"));
    assert!(rendered.contains("🤖 **Summarizer**: thinking…"));
    assert!(rendered.contains("🖼️ **Painter**: generating image..."));
    assert!(rendered.contains("🎤 **Narrator**: generating speech..."));

    let markers = marker::decode(&rendered);
    assert_eq!(markers.len(), 2);
    assert_eq!(
        markers[1],
        Marker::IntentButton {
            key: "intent:6:Summarizer:Refresh {Wallet} now".into(),
            agent: "Summarizer".into(),
            button_text: "Refresh".into(),
            prompt: "Refresh {Wallet} now".into(),
            rendered: "Refresh ABC123 now".into(),
        }
    );
}

#[test]
fn test_move_block_rekeys_calls() {
    let document = Document::parse(PORTFOLIO);
    let moved = document.move_block(4, 2).unwrap();
    let keys: Vec<_> = moved
        .calls(&Overrides::new())
        .into_iter()
        .map(|c| c.identity_key)
        .take(3)
        .collect();
    assert_eq!(
        keys,
        vec![
            "image:2:Painter:a chart of {Wallet}",
            "define:3:Wallet",
            "4:Summarizer:Balance of {Wallet}",
        ]
    );
    assert_eq!(moved.definitions(), document.definitions());
}
