use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "arbiter-cli")]
#[command(about = "Management CLI for the resource arbiter", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show server status and settings
    Status,
    /// List the four slots with owners and remaining lease time
    Resources,
    /// List connected sessions
    Sessions,
    /// Show last acquisition time per user
    Times,
    /// List banned addresses
    Bans,
    /// Free every resource, notifying current owners
    Free,
    /// Toggle rejection of auth messages
    RejectAuth {
        #[arg(action = clap::ArgAction::Set)]
        reject: bool,
    },
    /// Toggle rejection of resource requests
    RejectRequests {
        #[arg(action = clap::ArgAction::Set)]
        reject: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let get = |path: &str| {
        client
            .get(format!("{}{}", cli.url, path))
            .headers(headers.clone())
    };
    let post = |path: &str| {
        client
            .post(format!("{}{}", cli.url, path))
            .headers(headers.clone())
    };

    let res = match cli.command {
        Commands::Status => get("/admin/status").send().await?,
        Commands::Resources => get("/admin/resources").send().await?,
        Commands::Sessions => get("/admin/sessions").send().await?,
        Commands::Times => get("/admin/resource-times").send().await?,
        Commands::Bans => get("/admin/bans").send().await?,
        Commands::Free => post("/admin/free").send().await?,
        Commands::RejectAuth { reject } => {
            post("/admin/reject-auth")
                .json(&serde_json::json!({ "reject": reject }))
                .send()
                .await?
        }
        Commands::RejectRequests { reject } => {
            post("/admin/reject-requests")
                .json(&serde_json::json!({ "reject": reject }))
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let text = res.text().await?;
    if text.is_empty() {
        println!("OK ({})", status);
        return Ok(());
    }
    let json: Value = serde_json::from_str(&text)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
