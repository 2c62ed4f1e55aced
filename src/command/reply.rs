//! Reply sinks - where a handled command's single response goes

use crate::core::error::Result;
use async_trait::async_trait;
use std::io::Write;

/// Sends a textual response back into the originating conversation
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn reply(&self, text: &str) -> Result<()>;
}

/// Prints replies to standard output, for one-shot use from the CLI
pub struct StdoutReply;

#[async_trait]
impl ReplySink for StdoutReply {
    async fn reply(&self, text: &str) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", text)?;
        stdout.flush()?;
        Ok(())
    }
}
