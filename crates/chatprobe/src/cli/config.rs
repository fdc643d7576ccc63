use dotenvy::dotenv;
use eyre::Result;

/// Loads `.env` from the working directory, if there is one.
pub fn load_env() -> Result<()> {
    dotenv().ok();
    Ok(())
}
