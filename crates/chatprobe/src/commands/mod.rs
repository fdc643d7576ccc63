use async_trait::async_trait;
use eyre::Result;

pub mod batch;
pub mod chat;
pub mod list;

#[async_trait]
pub trait Command {
    async fn execute(&self) -> Result<()>;
}
