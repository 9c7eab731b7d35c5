//! Simple session example
//!
//! Logs in to a controller and reads one application.
//!
//! Run with: MODELWIRE_ADDRESS=10.0.0.5:17070 MODELWIRE_PASSWORD=secret cargo run --example simple_session

use modelwire::client::SessionBuilder;
use modelwire::core::{Credentials, ErrorKind, Operation};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct GetParams<'a> {
    application: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApplicationInfo {
    application: String,
    charm: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let address = std::env::var("MODELWIRE_ADDRESS").unwrap_or_else(|_| "127.0.0.1:17070".into());
    let password = std::env::var("MODELWIRE_PASSWORD").unwrap_or_default();
    let application = std::env::args().nth(1).unwrap_or_else(|| "mysql".into());

    let session = SessionBuilder::new(address).connect().await?;
    let info = session.login(Credentials::new("admin", password)).await?;
    println!("Logged in to model {:?}", info.model_uuid);
    println!("Endpoints: {}", info.endpoints.join(", "));

    match session
        .call::<_, ApplicationInfo>(Operation::ApplicationGet, GetParams { application: &application })
        .await
    {
        Ok(app) => println!("{} runs {}", app.application, app.charm),
        Err(e) if e.kind() == ErrorKind::Permanent => println!("Lookup failed: {}", e),
        Err(e) => return Err(e.into()),
    }

    let raw: serde_json::Value = session.call(Operation::ModelInfo, serde_json::json!({})).await?;
    tracing::debug!(model = %raw, "Model info");

    session.close().await;
    Ok(())
}
