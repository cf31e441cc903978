use crate::terminal::Terminal;
use crossterm::style::Color;

pub const HELP: &str = "\
TERMGLOBE
─────────────────
 q/Esc   Quit
 Space   Pause
 ?       Toggle help
 ↑/↓ k/j Tilt
 +/-     Zoom
 0       Reset zoom
 r       Auto-rotate on/off
 [/]     Rotation speed
 ,/.     Particle count
 c       Cycle palette
─────────────────";

/// Draw a centered help box into the back buffer
pub fn render_help_overlay(term: &mut Terminal, help_text: &str) {
    if help_text.is_empty() {
        return;
    }
    let (width, height) = term.size();

    let lines: Vec<&str> = help_text.lines().collect();
    let max_width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    let box_width = max_width + 4; // 2 chars padding each side
    let box_height = lines.len() + 2;

    let start_x = (width as usize).saturating_sub(box_width) / 2;
    let start_y = (height as usize).saturating_sub(box_height) / 2;

    let border = Some(Color::White);
    let text = Some(Color::Grey);

    // ┌─────┐
    term.set(start_x as i32, start_y as i32, '┌', border, false);
    for x in 1..box_width - 1 {
        term.set((start_x + x) as i32, start_y as i32, '─', border, false);
    }
    term.set((start_x + box_width - 1) as i32, start_y as i32, '┐', border, false);

    for (i, line) in lines.iter().enumerate() {
        let y = (start_y + 1 + i) as i32;
        term.set(start_x as i32, y, '│', border, false);
        let padding = max_width.saturating_sub(line.chars().count());
        let padded = format!(" {}{} ", line, " ".repeat(padding));
        term.set_str((start_x + 1) as i32, y, &padded, text, false);
        term.set((start_x + box_width - 1) as i32, y, '│', border, false);
    }

    // └─────┘
    let bottom_y = (start_y + box_height - 1) as i32;
    term.set(start_x as i32, bottom_y, '└', border, false);
    for x in 1..box_width - 1 {
        term.set((start_x + x) as i32, bottom_y, '─', border, false);
    }
    term.set((start_x + box_width - 1) as i32, bottom_y, '┘', border, false);
}
