mod app;
mod form;
mod handler;
mod logging;
mod tui;
mod ui;

use anyhow::Result;
use chatbot_core::{AppContext, Config};
use tracing::{info, warn};

use app::App;
use tui::EventHandler;

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = logging::init()?;

    let config = Config::load()?;
    let context = AppContext::init(config)?;
    info!(api = %context.api().base_url(), "Starting chatbot");

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let mut events = EventHandler::new(context.subscribe());
    let mut app = App::new(&context, events.sender());
    app.start();

    let result = run(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;

    if let Some(username) = &app.last_username {
        if let Err(err) = Config::save_last_username(username) {
            warn!(error = %err, "Failed to save last username");
        }
    }
    context.shutdown()?;

    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event),
            None => break,
        }
    }
    Ok(())
}
