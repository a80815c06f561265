use anyhow::Result;
use chatbot_core::{AppContext, ConversationId, MessageEntry, MessageRole};
use clap::Subcommand;
use colored::*;
use dialoguer::{theme::ColorfulTheme, Confirm};

use crate::explain;

#[derive(Subcommand)]
pub enum ConversationCommand {
    /// List your conversations, newest first
    List,
    /// Start a conversation
    Create {
        /// Title (1-50 characters)
        title: String,
    },
    /// Rename a conversation
    Rename { id: i64, title: String },
    /// Delete a conversation and its messages
    Delete {
        id: i64,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Print the message history
    Messages { id: i64 },
    /// Send a message and print the assistant's reply
    Send {
        id: i64,
        /// Message text
        #[arg(required = true, num_args = 1..)]
        content: Vec<String>,
    },
}

pub async fn run(context: &AppContext, command: ConversationCommand) -> Result<()> {
    let conversations = context.conversations();

    match command {
        ConversationCommand::List => {
            conversations
                .load()
                .await
                .map_err(|e| explain(e, "Failed to load conversations"))?;
            let items = conversations.items();
            if items.is_empty() {
                println!("{}", "No conversations yet".yellow());
                return Ok(());
            }
            for conversation in items {
                println!(
                    "{:>5}  {}  {}",
                    conversation.id.to_string().dimmed(),
                    conversation.created_at.format("%Y-%m-%d %H:%M").to_string().dimmed(),
                    conversation.title.bold()
                );
            }
        }
        ConversationCommand::Create { title } => {
            let conversation = conversations
                .create(&title)
                .await
                .map_err(|e| explain(e, "Failed to create conversation"))?;
            println!(
                "{} {} ({})",
                "Created".green(),
                conversation.title.bold(),
                conversation.id
            );
        }
        ConversationCommand::Rename { id, title } => {
            let conversation = conversations
                .rename(ConversationId(id), &title)
                .await
                .map_err(|e| explain(e, "Failed to rename conversation"))?;
            println!("{} {}", "Renamed to".green(), conversation.title.bold());
        }
        ConversationCommand::Delete { id, yes } => {
            let confirmed = yes
                || Confirm::with_theme(&ColorfulTheme::default())
                    .with_prompt(format!("Delete conversation {}?", id))
                    .default(false)
                    .interact()?;
            if !confirmed {
                println!("{}", "Cancelled".yellow());
                return Ok(());
            }
            conversations
                .delete(ConversationId(id))
                .await
                .map_err(|e| explain(e, "Failed to delete conversation"))?;
            println!("{} {}", "Deleted conversation".green(), id);
        }
        ConversationCommand::Messages { id } => {
            let session = context.messages();
            session.select(ConversationId(id));
            session
                .load()
                .await
                .map_err(|e| explain(e, "Failed to load messages"))?;
            let entries = session.entries();
            if entries.is_empty() {
                println!("{}", "No messages yet".yellow());
            }
            for entry in &entries {
                print_entry(entry);
            }
        }
        ConversationCommand::Send { id, content } => {
            let session = context.messages();
            session.select(ConversationId(id));
            let reply = session
                .send(&content.join(" "))
                .await
                .map_err(|e| explain(e, "Failed to send message"))?;
            if reply.role == MessageRole::Assistant {
                println!("{}", "Assistant:".bold().yellow());
                println!("{}", reply.content);
            }
        }
    }

    Ok(())
}

fn print_entry(entry: &MessageEntry) {
    let label = match entry.message.role {
        MessageRole::User => "You:".bold().cyan(),
        MessageRole::Assistant => "Assistant:".bold().yellow(),
    };
    println!(
        "{} {}",
        label,
        entry.message.timestamp.format("%H:%M").to_string().dimmed()
    );
    println!("{}\n", entry.message.content);
}
