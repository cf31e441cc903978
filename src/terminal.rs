use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{poll, read, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute, queue,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor},
    terminal::{
        disable_raw_mode, enable_raw_mode, size, Clear, ClearType, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};
use std::io::{self, stdout, Write};
use std::time::Duration;

/// Back buffer over the real terminal; frames are drawn with `set` and
/// flushed with `present`
pub struct Terminal {
    width: u16,
    height: u16,
    buffer: Vec<Vec<Cell>>,
    interactive: bool,
}

/// A single cell in the terminal buffer
#[derive(Clone, PartialEq)]
pub struct Cell {
    pub ch: char,
    pub fg: Option<Color>,
    pub bold: bool,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            ch: ' ',
            fg: None,
            bold: false,
        }
    }
}

impl Terminal {
    /// Take over the screen (raw mode + alternate screen) when `interactive`,
    /// otherwise just size a buffer for printing.
    pub fn new(interactive: bool) -> io::Result<Self> {
        let (width, height) = if interactive {
            size()?
        } else {
            size().ok().filter(|&(w, h)| w > 0 && h > 0).unwrap_or((100, 40))
        };

        if interactive {
            enable_raw_mode()?;
            execute!(stdout(), EnterAlternateScreen, Hide)?;
        }

        Ok(Self {
            width,
            height,
            buffer: vec![vec![Cell::default(); width as usize]; height as usize],
            interactive,
        })
    }

    pub fn size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    /// Re-read the terminal size; returns true when it changed
    pub fn sync_size(&mut self) -> io::Result<bool> {
        if !self.interactive {
            return Ok(false);
        }
        let (width, height) = size()?;
        if (width, height) == (self.width, self.height) {
            return Ok(false);
        }
        self.width = width;
        self.height = height;
        self.buffer = vec![vec![Cell::default(); width as usize]; height as usize];
        execute!(stdout(), Clear(ClearType::All))?;
        Ok(true)
    }

    pub fn clear(&mut self) {
        for row in &mut self.buffer {
            row.fill(Cell::default());
        }
    }

    /// Set a character at position with optional color
    pub fn set(&mut self, x: i32, y: i32, ch: char, fg: Option<Color>, bold: bool) {
        if x >= 0 && x < self.width as i32 && y >= 0 && y < self.height as i32 {
            self.buffer[y as usize][x as usize] = Cell { ch, fg, bold };
        }
    }

    /// Set a string starting at position
    pub fn set_str(&mut self, x: i32, y: i32, s: &str, fg: Option<Color>, bold: bool) {
        for (i, ch) in s.chars().enumerate() {
            self.set(x + i as i32, y, ch, fg, bold);
        }
    }

    /// Flush the whole buffer to the screen in one write
    pub fn present(&self) -> io::Result<()> {
        let mut out = stdout().lock();

        for (y, row) in self.buffer.iter().enumerate() {
            queue!(out, MoveTo(0, y as u16))?;
            let mut current: Option<Color> = None;
            let mut bold = false;

            for cell in row {
                if cell.bold != bold {
                    let attr = if cell.bold { Attribute::Bold } else { Attribute::NormalIntensity };
                    queue!(out, SetAttribute(attr))?;
                    bold = cell.bold;
                }
                if cell.fg != current {
                    match cell.fg {
                        Some(color) => queue!(out, SetForegroundColor(color))?,
                        None => queue!(out, ResetColor)?,
                    }
                    current = cell.fg;
                }
                queue!(out, Print(cell.ch))?;
            }
            queue!(out, SetAttribute(Attribute::Reset), ResetColor)?;
        }

        out.flush()
    }

    /// Non-blocking key check, returns (code, modifiers)
    pub fn check_key(&self) -> io::Result<Option<(KeyCode, KeyModifiers)>> {
        if !self.interactive {
            return Ok(None);
        }
        while poll(Duration::from_millis(0))? {
            if let Event::Key(key) = read()? {
                if key.kind != KeyEventKind::Release {
                    return Ok(Some((key.code, key.modifiers)));
                }
            }
        }
        Ok(None)
    }

    pub fn sleep(&self, seconds: f32) {
        if seconds > 0.0 {
            std::thread::sleep(Duration::from_secs_f32(seconds));
        }
    }

    /// Print the buffer to stdout with ANSI colors (for `--print`)
    pub fn print_to_stdout(&self) -> io::Result<()> {
        let mut out = stdout().lock();
        for row in &self.buffer {
            let end = row.iter().rposition(|c| c.ch != ' ').map_or(0, |i| i + 1);
            // escape codes are only written when the style changes
            let mut style: (Option<Color>, bool) = (None, false);
            for cell in &row[..end] {
                let next = if cell.ch == ' ' { style } else { (cell.fg, cell.bold) };
                if next != style {
                    write!(out, "\x1b[0m")?;
                    if next.1 {
                        write!(out, "\x1b[1m")?;
                    }
                    if let Some(code) = next.0.and_then(ansi_fg) {
                        write!(out, "{code}")?;
                    }
                    style = next;
                }
                write!(out, "{}", cell.ch)?;
            }
            if style != (None, false) {
                write!(out, "\x1b[0m")?;
            }
            writeln!(out)?;
        }
        out.flush()
    }

    /// Row contents as plain text, used by tests
    #[cfg(test)]
    pub fn row_text(&self, y: usize) -> String {
        self.buffer[y].iter().map(|c| c.ch).collect()
    }

    #[cfg(test)]
    pub fn cell(&self, x: usize, y: usize) -> &Cell {
        &self.buffer[y][x]
    }

    #[cfg(test)]
    pub fn headless(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            buffer: vec![vec![Cell::default(); width as usize]; height as usize],
            interactive: false,
        }
    }
}

fn ansi_fg(color: Color) -> Option<String> {
    let code = match color {
        Color::Rgb { r, g, b } => return Some(format!("\x1b[38;2;{r};{g};{b}m")),
        Color::AnsiValue(v) => return Some(format!("\x1b[38;5;{v}m")),
        Color::Black => 30,
        Color::DarkRed => 31,
        Color::DarkGreen => 32,
        Color::DarkYellow => 33,
        Color::DarkBlue => 34,
        Color::DarkMagenta => 35,
        Color::DarkCyan => 36,
        Color::Grey => 37,
        Color::DarkGrey => 90,
        Color::Red => 91,
        Color::Green => 92,
        Color::Yellow => 93,
        Color::Blue => 94,
        Color::Magenta => 95,
        Color::Cyan => 96,
        Color::White => 97,
        _ => return None,
    };
    Some(format!("\x1b[{code}m"))
}

impl Drop for Terminal {
    fn drop(&mut self) {
        if self.interactive {
            let _ = execute!(stdout(), Show, LeaveAlternateScreen);
            let _ = disable_raw_mode();
        }
    }
}
