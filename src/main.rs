mod app;
mod braille;
mod camera;
mod ui;

use anyhow::{Context, Result};
use app::App;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseButton,
    MouseEvent, MouseEventKind,
};
use crossterm::execute;
use globe_morph::board::{CountrySource, TownTransport};
use globe_morph::config::Configuration;
use globe_morph::data;
use ratatui::DefaultTerminal;
use std::fs::File;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const CONFIG_FILE: &str = "globe.json";
const LOG_FILE: &str = "globe-morph.log";

fn main() -> Result<()> {
    init_logging()?;

    let config = if Path::new(CONFIG_FILE).exists() {
        Configuration::load(Path::new(CONFIG_FILE))
            .with_context(|| format!("loading {CONFIG_FILE}"))?
    } else {
        Configuration::default()
    };
    let (countries, towns) = load_data();

    let mut terminal = ratatui::init();
    terminal.clear()?;

    // Clicks pick, drags rotate the globe
    execute!(std::io::stdout(), EnableMouseCapture)?;

    let result = run(&mut terminal, config, &countries, &towns);

    // Hand the terminal back even when the loop failed
    let _ = execute!(std::io::stdout(), DisableMouseCapture);
    ratatui::restore();

    result
}

/// Logs go to a file, the terminal belongs to the viewer. Off unless
/// `GLOBE_MORPH_LOG` holds a filter such as `debug` or `globe_morph=trace`.
fn init_logging() -> Result<()> {
    let Ok(filter) = std::env::var("GLOBE_MORPH_LOG") else {
        return Ok(());
    };
    let file = File::create(LOG_FILE).with_context(|| format!("creating {LOG_FILE}"))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn load_data() -> (Vec<CountrySource>, Vec<TownTransport>) {
    let data_dir = Path::new("data");
    let countries = data::load_countries(&data_dir.join("countries.json"))
        .inspect_err(|error| tracing::info!(%error, "using the built-in world"))
        .unwrap_or_else(|_| data::simple_world());
    let towns = data::load_transports(&data_dir.join("transports.json"))
        .inspect_err(|error| tracing::info!(%error, "using the built-in towns"))
        .unwrap_or_else(|_| data::simple_towns());
    (countries, towns)
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::ScrollUp => app.camera.zoom_in(),
        MouseEventKind::ScrollDown => app.camera.zoom_out(),
        // Click picks, dragging from there rotates
        MouseEventKind::Down(MouseButton::Left) => {
            app.pick(mouse.column, mouse.row);
            app.last_mouse = Some((mouse.column, mouse.row));
        }
        MouseEventKind::Drag(MouseButton::Left) => {
            app.handle_drag(mouse.column, mouse.row);
        }
        MouseEventKind::Up(MouseButton::Left) => {
            app.end_drag();
        }
        _ => {}
    }
}

fn run(
    terminal: &mut DefaultTerminal,
    config: Configuration,
    countries: &[CountrySource],
    towns: &[TownTransport],
) -> Result<()> {
    let size = terminal.size()?;
    let mut app = App::new(config, size.width as usize, size.height as usize);
    app.load(countries, towns);

    let mut last_frame = Instant::now();
    loop {
        terminal.draw(|frame| ui::render(frame, &app))?;

        // ~60fps
        if event::poll(Duration::from_millis(16))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => app.quit(),
                    KeyCode::Char('p') | KeyCode::Char('P') => app.cycle_projection(),
                    KeyCode::Char('e') | KeyCode::Char('E') => app.toggle_extrusion(),
                    KeyCode::Char('y') | KeyCode::Char('Y') => app.cycle_year(),
                    KeyCode::Char('l') | KeyCode::Char('L') => app.toggle_limits(),
                    KeyCode::Char('c') | KeyCode::Char('C') => app.toggle_cones(),
                    KeyCode::Char('+') | KeyCode::Char('=') => app.camera.zoom_in(),
                    KeyCode::Char('-') | KeyCode::Char('_') => app.camera.zoom_out(),
                    _ => {}
                },
                Event::Mouse(mouse) => handle_mouse(&mut app, mouse),
                Event::Resize(width, height) => app.resize(width as usize, height as usize),
                _ => {}
            }
        }

        let now = Instant::now();
        app.tick(now - last_frame);
        last_frame = now;

        if app.should_quit {
            break;
        }
    }

    Ok(())
}
