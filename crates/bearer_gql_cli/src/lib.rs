//! Command-line interface for bearer_gql.
//!
//! # Usage
//!
//! ```bash
//! # Log in with GQL_API_USERNAME / GQL_API_PASSWORD and store the token
//! bearer-gql login
//!
//! # Run a query with the stored token
//! bearer-gql query posts.graphql --auth --variables '{"first": 10}'
//!
//! # HTTPS endpoints work too
//! bearer-gql --endpoint https://cms.example.com/graphql query posts.graphql --auth
//!
//! # Run a query the way a build step would, with a known token
//! bearer-gql query posts.graphql --static-token "$TOKEN"
//!
//! # Inspect or clear the stored token
//! bearer-gql token show
//! bearer-gql token clear
//!
//! # Ask the server when the stored token expires
//! bearer-gql expiry
//! ```

use bearer_gql::{
    ClientConfig, CookieJarStore, EnvCredentials, ExpiryCheck, Fetcher, RequestDescriptor,
    Response, TokenStore, TOKEN_COOKIE_NAME,
};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "bearer-gql")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// GraphQL endpoint
    #[arg(long, global = true, default_value = "http://localhost:8080/graphql")]
    pub endpoint: String,

    /// Cookie jar holding the bearer token
    #[arg(long, global = true, default_value = ".bearer_gql/cookies.json")]
    pub jar: PathBuf,

    /// Cookie name of the bearer token
    #[arg(long, global = true, default_value = TOKEN_COOKIE_NAME)]
    pub cookie: String,

    /// Request timeout in seconds
    #[arg(long, global = true, default_value = "30")]
    pub timeout: u64,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum ExpiryMode {
    /// Expired only at the exact expiration millisecond
    #[default]
    Exact,
    /// Expired at or after the expiration time
    AtOrAfter,
}

impl From<ExpiryMode> for ExpiryCheck {
    fn from(mode: ExpiryMode) -> Self {
        match mode {
            ExpiryMode::Exact => ExpiryCheck::Exact,
            ExpiryMode::AtOrAfter => ExpiryCheck::AtOrAfter,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a query or mutation
    Query {
        /// File containing the GraphQL document
        #[arg(required_unless_present = "inline", conflicts_with = "inline")]
        file: Option<PathBuf>,

        /// GraphQL document given inline
        #[arg(short = 'e', long = "inline")]
        inline: Option<String>,

        /// Variables as a JSON object
        #[arg(long)]
        variables: Option<String>,

        /// Attach the stored bearer token
        #[arg(long)]
        auth: bool,

        /// Use the static strategy with this token (implies --auth)
        #[arg(long, value_name = "TOKEN")]
        static_token: Option<String>,

        /// Times a request may be sent while responses carry errors (not used
        /// with --static-token)
        #[arg(long, default_value = "2")]
        attempts: u32,

        /// Expiry comparison for --static-token
        #[arg(long, value_enum, default_value = "exact")]
        expiry_check: ExpiryMode,
    },

    /// Log in and store a fresh token
    Login,

    /// Inspect or clear the stored token
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },

    /// Print the remote expiration of the stored token
    Expiry,

    /// Print version information
    Version,
}

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum TokenAction {
    /// Print the stored token
    Show,
    /// Remove the stored token
    Clear,
}

pub async fn run(cli: Cli) -> Result<i32, Box<dyn std::error::Error>> {
    let store = Arc::new(CookieJarStore::new(&cli.jar, &cli.cookie));

    match &cli.command {
        Commands::Query {
            file,
            inline,
            variables,
            auth,
            static_token,
            attempts,
            expiry_check,
        } => {
            let query = match (inline, file) {
                (Some(query), _) => query.clone(),
                (None, Some(path)) => std::fs::read_to_string(path)?,
                (None, None) => return Err("a query file or --inline document is required".into()),
            };

            let mut descriptor = RequestDescriptor::new(query);
            if let Some(vars) = variables {
                descriptor = descriptor.json_variables(serde_json::from_str(vars)?);
            }
            if *auth || static_token.is_some() {
                descriptor = descriptor.with_token();
            }

            let config = client_config(&cli)
                .auth_attempts(*attempts)
                .expiry_check((*expiry_check).into());
            let fetcher = build_fetcher(config, store)?;

            let response = match static_token {
                Some(token) => fetcher.fetch_static(&descriptor, token).await?,
                None => fetcher.fetch_data(&descriptor).await?,
            };
            Ok(print_response(&response, cli.quiet))
        }
        Commands::Login => {
            let fetcher = build_fetcher(client_config(&cli), store.clone())?;
            fetcher.refresh().await?;
            if !cli.quiet {
                println!(
                    "{} token stored in {}",
                    "Logged in:".green().bold(),
                    store.path().display()
                );
            }
            Ok(0)
        }
        Commands::Token { action } => token_command(*action, &*store, cli.quiet),
        Commands::Expiry => {
            let Some(token) = store.retrieve()? else {
                eprintln!("{} no token stored", "Error:".red().bold());
                return Ok(1);
            };
            let fetcher = build_fetcher(client_config(&cli), store)?;
            let auth = fetcher.authenticator();
            match auth.token_expiration(&token, &auth.username()?).await? {
                Some(expiration) => println!("{expiration}"),
                None => println!("{}", "no expiration reported".dimmed()),
            }
            Ok(0)
        }
        Commands::Version => {
            println!("bearer-gql {}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
    }
}

fn client_config(cli: &Cli) -> ClientConfig {
    ClientConfig::new(&cli.endpoint)
        .timeout(Duration::from_secs(cli.timeout))
        .token_cookie(&cli.cookie)
}

fn build_fetcher(
    config: ClientConfig,
    store: Arc<CookieJarStore>,
) -> Result<Fetcher, Box<dyn std::error::Error>> {
    Ok(Fetcher::builder(config)
        .token_store(store)
        .credentials(Arc::new(EnvCredentials::default()))
        .build()?)
}

fn token_command(
    action: TokenAction,
    store: &dyn TokenStore,
    quiet: bool,
) -> Result<i32, Box<dyn std::error::Error>> {
    match action {
        TokenAction::Show => match store.retrieve()? {
            Some(token) => {
                println!("{token}");
                Ok(0)
            }
            None => {
                if !quiet {
                    eprintln!("{}", "No token stored".yellow());
                }
                Ok(1)
            }
        },
        TokenAction::Clear => {
            store.clear()?;
            if !quiet {
                println!("{}", "Token cleared".green());
            }
            Ok(0)
        }
    }
}

/// Prints the envelope and returns the exit code.
fn print_response(response: &Response, quiet: bool) -> i32 {
    if let Some(data) = &response.data {
        match serde_json::to_string_pretty(data) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("{} {}", "Error:".red().bold(), e),
        }
    }

    match &response.errors {
        Some(errors) => {
            for error in errors {
                eprintln!("{} {}", "GraphQL error:".red().bold(), error.message);
            }
            1
        }
        None => {
            if !quiet && response.data.is_none() {
                eprintln!("{}", "No data in response".yellow());
            }
            0
        }
    }
}
