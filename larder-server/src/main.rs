use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        None | Some("serve") => {
            let server = larder_server::build()?;
            server.listen().await
        }
        Some("token") => {
            let subject = args.next().unwrap_or_else(|| "admin".to_string());
            let config = larder_server::load_config().snapshot();
            let issued = larder_server::token_service(&config)?.issue_admin(&subject)?;
            eprintln!("admin token for '{subject}', valid until {}", issued.expires_at);
            println!("{}", issued.token);
            Ok(())
        }
        Some(other) => anyhow::bail!("unknown command '{other}' (expected 'serve' or 'token')"),
    }
}
