#![allow(dead_code)]

use std::sync::Arc;

use agentmark::{
    config::{ProviderType, SessionConfig},
    generation::Generator,
    SessionContext,
};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[ctor::ctor]
fn init_tests() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// A portfolio note with one of every construct.
pub const PORTFOLIO: &str = "\
# Portfolio

:::
@define[Wallet](ABC123)
**Description:** Address to inspect.

@mcp[SolanaMCP](\"https://mcp.solana.com/mcp\")
Solana protocol metadata.

@tool[Balance](address: String)

@ai[Summarizer](\"gpt-4o-mini\")
tool:[Balance]
Summarizes holdings.
:::

Wallet: ~define[Wallet](Wallet address)

~ai[Summarizer](\"Balance of {Wallet}\")

~ai-image[Painter](a chart of {Wallet})

~ai-speech[Narrator](Read the summary)

~intent[Summarizer](<Refresh>, Refresh {Wallet} now)

```md
~ai[Ghost](inside a code fence)
```";

pub fn context(generator: impl Generator + 'static) -> SessionContext {
    SessionContext::new(Arc::new(generator), SessionConfig::default())
}

pub fn echo_config() -> SessionConfig {
    let mut config = SessionConfig::default();
    config.generator.provider_type = ProviderType::Echo;
    config
}

/// Echo generator with an in-memory media store.
pub fn echo_context() -> SessionContext {
    SessionContext::from_config(echo_config(), None).expect("echo context")
}
