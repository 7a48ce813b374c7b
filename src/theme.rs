use ratatui::style::Color;

#[derive(Debug, Clone, Copy)]
pub struct UiPalette {
    pub base_fg: Color,
    pub base_bg: Option<Color>,
    pub accent: Color,
    pub muted: Color,
    pub heading: Color,
    pub mode_line_bg: Color,
    pub border: Color,
}

struct NamedPalette {
    name: &'static str,
    palette: UiPalette,
}

const PALETTES: &[NamedPalette] = &[
    NamedPalette {
        name: "leuven",
        palette: UiPalette {
            base_fg: Color::Rgb(0x33, 0x33, 0x33),
            base_bg: Some(Color::Rgb(0xff, 0xff, 0xff)),
            accent: Color::Rgb(0x00, 0x66, 0xcc),
            muted: Color::Rgb(0x8d, 0x8d, 0x84),
            heading: Color::Rgb(0x33, 0x44, 0xd6),
            mode_line_bg: Color::Rgb(0x33, 0x55, 0x82),
            border: Color::Rgb(0xb0, 0xb0, 0xb0),
        },
    },
    NamedPalette {
        name: "wombat",
        palette: UiPalette {
            base_fg: Color::Rgb(0xf6, 0xf3, 0xe8),
            base_bg: Some(Color::Rgb(0x24, 0x24, 0x24)),
            accent: Color::Rgb(0x8a, 0xc6, 0xf2),
            muted: Color::Rgb(0x99, 0x96, 0x8b),
            heading: Color::Rgb(0xe5, 0x78, 0x6d),
            mode_line_bg: Color::Rgb(0x44, 0x44, 0x44),
            border: Color::Rgb(0x65, 0x65, 0x65),
        },
    },
    NamedPalette {
        name: "tango-dark",
        palette: UiPalette {
            base_fg: Color::Rgb(0xee, 0xee, 0xec),
            base_bg: Some(Color::Rgb(0x2e, 0x34, 0x36)),
            accent: Color::Rgb(0xfc, 0xe9, 0x4f),
            muted: Color::Rgb(0x88, 0x8a, 0x85),
            heading: Color::Rgb(0x72, 0x9f, 0xcf),
            mode_line_bg: Color::Rgb(0x55, 0x57, 0x53),
            border: Color::Rgb(0x55, 0x57, 0x53),
        },
    },
    NamedPalette {
        name: "terminal",
        palette: UiPalette {
            base_fg: Color::Reset,
            base_bg: None,
            accent: Color::Cyan,
            muted: Color::DarkGray,
            heading: Color::Blue,
            mode_line_bg: Color::DarkGray,
            border: Color::DarkGray,
        },
    },
];

pub struct ThemeManager {
    theme_names: Vec<String>,
}

impl ThemeManager {
    pub fn load() -> Self {
        let mut theme_names: Vec<String> = PALETTES.iter().map(|p| p.name.to_string()).collect();
        theme_names.sort();
        Self { theme_names }
    }

    pub fn theme_names(&self) -> &[String] {
        &self.theme_names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.theme_names.iter().any(|t| t == name)
    }

    pub fn ui_palette(&self, name: &str) -> UiPalette {
        PALETTES
            .iter()
            .find(|p| p.name == name)
            .or_else(|| PALETTES.iter().find(|p| p.name == self.fallback_name()))
            .map(|p| p.palette)
            .unwrap_or(PALETTES[0].palette)
    }

    pub fn fallback_name(&self) -> &str {
        "terminal"
    }
}
