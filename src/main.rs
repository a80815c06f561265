use anyhow::{anyhow, bail, Result};
use chatbot_core::guard::evaluate;
use chatbot_core::{ApiError, AppContext, Config, Decision, Route};
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;

mod account;
mod conversations;
mod datasources;
mod logging;

use conversations::ConversationCommand;
use datasources::DataSourceCommand;

#[derive(Parser)]
#[command(name = "chatbot-admin")]
#[command(about = "Manage accounts, conversations and data sources on a chatbot server")]
#[command(version)]
struct Cli {
    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and remember the session
    Login {
        /// Username (prompted when omitted)
        username: Option<String>,
    },
    /// End the current session
    Logout,
    /// Create an account (interactive)
    Signup,
    /// Show the signed-in user
    Whoami,
    /// Show or update your profile
    Profile {
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
    },
    /// List all accounts (admin only)
    Users,
    /// Manage data sources (admin only)
    #[command(subcommand)]
    Datasources(DataSourceCommand),
    /// Manage your conversations
    #[command(subcommand)]
    Conversations(ConversationCommand),
}

impl Commands {
    /// The page whose access rules apply to this command.
    fn route(&self) -> Route {
        match self {
            Commands::Login { .. } => Route::Login,
            Commands::Signup => Route::Signup,
            Commands::Logout | Commands::Whoami | Commands::Profile { .. } | Commands::Users => {
                Route::Account
            }
            Commands::Datasources(DataSourceCommand::Create { .. }) => Route::DataSourceCreate,
            Commands::Datasources(_) => Route::DataSources,
            Commands::Conversations(_) => Route::Conversations,
        }
    }
}

/// Turn a failed operation into the message the user should see.
pub fn explain(err: ApiError, fallback: &str) -> anyhow::Error {
    anyhow!(err.user_message(fallback))
}

/// Refuse to run a command the current session may not see.
fn require(context: &AppContext, route: Route) -> Result<()> {
    match evaluate(route, context.auth().guard_state()) {
        Decision::Render => Ok(()),
        Decision::Redirect(Route::Login) => {
            bail!("Not logged in. Run `chatbot-admin login` first.")
        }
        Decision::Redirect(Route::Unauthorized) => {
            bail!("You do not have permission to perform this action.")
        }
        Decision::Redirect(other) => bail!("Redirected to {}", other),
        Decision::Loading => bail!("Session is still being checked"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = Config::load()?;
    let context = AppContext::init(config)?;
    debug!(api = %context.api().base_url(), "Using API");

    let result = run(&context, cli.command).await;
    context.shutdown()?;
    result
}

async fn run(context: &AppContext, command: Commands) -> Result<()> {
    context.auth().resolve().await;
    require(context, command.route())?;

    match command {
        Commands::Login { username } => account::login(context, username).await,
        Commands::Logout => account::logout(context).await,
        Commands::Signup => account::signup(context).await,
        Commands::Whoami => account::whoami(context),
        Commands::Profile {
            email,
            first_name,
            last_name,
        } => account::profile(context, email, first_name, last_name).await,
        Commands::Users => account::users(context).await,
        Commands::Datasources(command) => datasources::run(context, command).await,
        Commands::Conversations(command) => conversations::run(context, command).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_routes_for_commands() {
        let cli = Cli::parse_from(["chatbot-admin", "datasources", "list"]);
        assert_eq!(cli.command.route(), Route::DataSources);

        let cli = Cli::parse_from([
            "chatbot-admin",
            "datasources",
            "create",
            "Handbook",
            "--file",
            "handbook.pdf",
        ]);
        assert_eq!(cli.command.route(), Route::DataSourceCreate);

        let cli = Cli::parse_from(["chatbot-admin", "-vv", "conversations", "list"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.command.route(), Route::Conversations);
    }

    #[test]
    fn test_users_uses_account_route() {
        let cli = Cli::parse_from(["chatbot-admin", "users"]);
        assert_eq!(cli.command.route(), Route::Account);
    }
}
