use crate::app::App;
use crate::braille::BrailleCanvas;
use crate::camera::Camera;
use globe_morph::board::BoardMesh;
use globe_morph::morph::MorphableGeometry;
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget},
    Frame,
};

/// Render the UI
pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(frame.area());

    render_map(frame, app, chunks[0]);
    render_status_bar(frame, app, chunks[1]);
}

fn render_map(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(
            format!(" Globe · {} ", app.projection()),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let (width, height) = (inner.width as usize, inner.height as usize);
    let mut camera = app.camera.clone();
    camera.set_size(width * 2, height * 4);
    let cull = app.is_globe();

    let mut countries = BrailleCanvas::new(width, height);
    for mesh in app.countries.meshes().iter().filter(|m| m.is_rendered()) {
        draw_wireframe(&mut countries, &camera, mesh.geometry(), mesh.state().scale(), cull);
    }
    let mut cones = BrailleCanvas::new(width, height);
    for mesh in app.cones.meshes().iter().filter(|m| m.is_rendered()) {
        draw_wireframe(&mut cones, &camera, mesh.geometry(), mesh.state().scale(), cull);
    }
    let mut highlights = BrailleCanvas::new(width, height);
    for overlay in app.countries.overlays().iter().chain(app.cones.overlays()) {
        if overlay.is_visible() {
            draw_wireframe(&mut highlights, &camera, overlay.geometry(), overlay.scale(), cull);
        }
    }

    frame.render_widget(
        GlobeWidget {
            layers: [
                (countries, Color::Cyan),
                (cones, Color::Yellow),
                (highlights, Color::Magenta),
            ],
        },
        inner,
    );
}

fn draw_wireframe(canvas: &mut BrailleCanvas, camera: &Camera, geometry: &MorphableGeometry, scale: f64, cull: bool) {
    for [a, b, c] in geometry.triangles() {
        let corners = [a, b, c].map(|p| camera.project(p * scale, cull));
        for (from, to) in [(0, 1), (1, 2), (2, 0)] {
            if let (Some(from), Some(to)) = (corners[from], corners[to]) {
                canvas.draw_line(from, to);
            }
        }
    }
}

/// Braille layers painted back to front, later layers on top.
struct GlobeWidget {
    layers: [(BrailleCanvas, Color); 3],
}

impl Widget for GlobeWidget {
    fn render(self, area: Rect, buf: &mut Buffer) {
        for (canvas, color) in &self.layers {
            for (row_idx, row) in canvas.rows().enumerate().take(area.height as usize) {
                let y = area.y + row_idx as u16;
                for (col_idx, ch) in row.chars().enumerate().take(area.width as usize) {
                    if ch == '\u{2800}' {
                        continue;
                    }
                    buf[(area.x + col_idx as u16, y)].set_char(ch).set_fg(*color);
                }
            }
        }
    }
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let toggle = |on: bool, label: &'static str| {
        Span::styled(label, Style::default().fg(if on { Color::Green } else { Color::DarkGray }))
    };
    let status = Line::from(vec![
        Span::styled(" Year: ", Style::default().fg(Color::DarkGray)),
        Span::styled(app.year().unwrap_or("-").to_string(), Style::default().fg(Color::Yellow)),
        Span::raw(" "),
        toggle(app.extruded(), "[e]xtrude "),
        toggle(app.with_limits(), "[l]imits "),
        toggle(app.cones.show(), "[c]ones "),
        Span::styled("| ", Style::default().fg(Color::DarkGray)),
        Span::styled(app.picked.clone().unwrap_or_default(), Style::default().fg(Color::Magenta)),
        Span::styled(
            " | p:projection y:year click:pick drag:rotate +/-:zoom q:quit",
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    frame.render_widget(Paragraph::new(status), area);
}
