use ethload_core::KeyPair;
use tracing::info;

use super::Session;

pub async fn accounts(session: &Session, generate: usize) -> Result<(), Box<dyn std::error::Error>> {
    let node_accounts = session.client.accounts().await?;
    if node_accounts.is_empty() {
        info!("node exposes no accounts");
    } else {
        info!(
            "node exposes {} accounts (dev mode available)",
            node_accounts.len()
        );
        for account in &node_accounts {
            println!("{account}");
        }
    }

    if generate > 0 {
        let keys = (0..generate).map(|_| KeyPair::generate()).collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&keys)?);
    }
    Ok(())
}
