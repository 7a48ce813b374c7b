use ropey::Rope;
use unicode_width::UnicodeWidthChar;

#[derive(Debug, Clone)]
pub struct EditSession {
    pub buffer_id: String,
    rope: Rope,
    cursor_char: usize,
    preferred_col: Option<usize>,
    scroll: usize,
    dirty: bool,
}

impl EditSession {
    pub fn new(buffer_id: &str, content: &str) -> Self {
        Self {
            buffer_id: buffer_id.to_string(),
            rope: Rope::from_str(content),
            cursor_char: 0,
            preferred_col: None,
            scroll: 0,
            dirty: false,
        }
    }

    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn scroll(&self) -> usize {
        self.scroll
    }

    pub fn lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .rope
            .lines()
            .map(|line| {
                let mut s = line.to_string();
                if s.ends_with('\n') {
                    s.pop();
                    if s.ends_with('\r') {
                        s.pop();
                    }
                }
                s
            })
            .collect();
        if lines.is_empty() {
            lines.push(String::new());
        }
        lines
    }

    pub fn insert_char(&mut self, c: char) {
        self.rope.insert_char(self.cursor_char, c);
        self.cursor_char = self.cursor_char.saturating_add(1);
        self.preferred_col = None;
        self.dirty = true;
    }

    pub fn insert_str(&mut self, text: &str) {
        self.rope.insert(self.cursor_char, text);
        self.cursor_char = self.cursor_char.saturating_add(text.chars().count());
        self.preferred_col = None;
        self.dirty = true;
    }

    pub fn backspace(&mut self) {
        if self.cursor_char == 0 {
            return;
        }
        let prev = self.cursor_char - 1;
        self.rope.remove(prev..self.cursor_char);
        self.cursor_char = prev;
        self.preferred_col = None;
        self.dirty = true;
    }

    pub fn delete(&mut self) {
        if self.cursor_char >= self.rope.len_chars() {
            return;
        }
        let next = self.cursor_char + 1;
        self.rope.remove(self.cursor_char..next);
        self.preferred_col = None;
        self.dirty = true;
    }

    pub fn move_left(&mut self) {
        if self.cursor_char > 0 {
            self.cursor_char -= 1;
        }
        self.preferred_col = None;
    }

    pub fn move_right(&mut self) {
        if self.cursor_char < self.rope.len_chars() {
            self.cursor_char += 1;
        }
        self.preferred_col = None;
    }

    pub fn move_up(&mut self) {
        let (line, _) = self.cursor_line_col();
        if line == 0 {
            return;
        }
        self.move_to_line(line - 1);
    }

    pub fn move_down(&mut self) {
        let (line, _) = self.cursor_line_col();
        let max_line = self.rope.len_lines().saturating_sub(1);
        if line >= max_line {
            return;
        }
        self.move_to_line(line + 1);
    }

    pub fn move_page(&mut self, delta: isize) {
        let (line, _) = self.cursor_line_col();
        let max_line = self.rope.len_lines().saturating_sub(1);
        let target_line = if delta.is_negative() {
            line.saturating_sub(delta.unsigned_abs())
        } else {
            (line + delta as usize).min(max_line)
        };
        self.move_to_line(target_line);
    }

    fn move_to_line(&mut self, target_line: usize) {
        let (_, col) = self.cursor_line_col();
        let desired = self.preferred_col.unwrap_or(col);
        let target_col = desired.min(line_len_chars(&self.rope, target_line));
        self.cursor_char = self.rope.line_to_char(target_line) + target_col;
        self.preferred_col = Some(desired);
    }

    pub fn move_line_start(&mut self) {
        let (line, _) = self.cursor_line_col();
        self.cursor_char = self.rope.line_to_char(line);
        self.preferred_col = None;
    }

    pub fn move_line_end(&mut self) {
        let (line, _) = self.cursor_line_col();
        let len = line_len_chars(&self.rope, line);
        self.cursor_char = self.rope.line_to_char(line) + len;
        self.preferred_col = None;
    }

    pub fn cursor_line_col(&self) -> (usize, usize) {
        let cursor = self.cursor_char.min(self.rope.len_chars());
        let line = self.rope.char_to_line(cursor);
        let col = cursor - self.rope.line_to_char(line);
        (line, col)
    }

    pub fn ensure_cursor_visible(&mut self, height: u16) {
        let height = height.max(1) as usize;
        let (line, _) = self.cursor_line_col();
        if line < self.scroll {
            self.scroll = line;
        } else if line >= self.scroll + height {
            self.scroll = line + 1 - height;
        }
    }

    pub fn cursor_offset(&self, width: u16, height: u16) -> Option<(u16, u16)> {
        let (line, col) = self.cursor_line_col();
        if line < self.scroll {
            return None;
        }
        let visible_line = line - self.scroll;
        if visible_line >= height as usize {
            return None;
        }
        let line_str = self.rope.line(line).to_string();
        let cells: usize = line_str
            .chars()
            .take(col)
            .map(|ch| UnicodeWidthChar::width(ch).unwrap_or(0))
            .sum();
        let x = cells.min(width as usize).try_into().ok()?;
        let y = visible_line.try_into().ok()?;
        Some((x, y))
    }
}

fn line_len_chars(rope: &Rope, line: usize) -> usize {
    if line >= rope.len_lines() {
        return 0;
    }
    let slice = rope.line(line);
    let mut len = slice.len_chars();
    if len == 0 {
        return 0;
    }
    if slice.char(len - 1) == '\n' {
        len = len.saturating_sub(1);
    }
    len
}

#[cfg(test)]
mod tests {
    use super::EditSession;
    use pretty_assertions::assert_eq;

    #[test]
    fn typing_marks_dirty_and_changes_text() {
        let mut session = EditSession::new("notes", "ab");
        assert!(!session.is_dirty());
        session.move_line_end();
        session.insert_char('c');
        session.insert_str("\nd");
        assert!(session.is_dirty());
        assert_eq!(session.text(), "abc\nd");
        assert_eq!(session.cursor_line_col(), (1, 1));
    }

    #[test]
    fn backspace_and_delete_respect_bounds() {
        let mut session = EditSession::new("notes", "xy");
        session.backspace();
        assert_eq!(session.text(), "xy");
        session.delete();
        assert_eq!(session.text(), "y");
        session.move_line_end();
        session.delete();
        session.backspace();
        assert_eq!(session.text(), "");
    }

    #[test]
    fn vertical_moves_keep_preferred_column() {
        let mut session = EditSession::new("notes", "long line\nab\nanother line");
        session.move_line_end();
        session.move_down();
        assert_eq!(session.cursor_line_col(), (1, 2));
        session.move_down();
        assert_eq!(session.cursor_line_col(), (2, 9));
        session.move_page(-10);
        assert_eq!(session.cursor_line_col(), (0, 9));
    }

    #[test]
    fn scroll_follows_cursor() {
        let text = (0..20).map(|i| format!("line {i}\n")).collect::<String>();
        let mut session = EditSession::new("notes", &text);
        session.move_page(15);
        session.ensure_cursor_visible(5);
        assert_eq!(session.scroll(), 11);
        assert_eq!(session.cursor_offset(40, 5), Some((0, 4)));
        session.move_page(-15);
        session.ensure_cursor_visible(5);
        assert_eq!(session.scroll(), 0);
    }
}
