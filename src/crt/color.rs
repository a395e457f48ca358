//! Color pairs, emphasis attributes and the semantic color registry.
//!
//! The terminal only knows the eight base colors plus "use the terminal
//! default". Every (foreground, background) combination is registered as a
//! color pair with id `bg * 10 + fg`, and every semantic role of the
//! dashboard resolves to one pair plus optional bold/blink emphasis.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// The base palette. `Reset` means "use the terminal default".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BaseColor {
    Black = 0,
    Red = 1,
    Green = 2,
    Yellow = 3,
    Blue = 4,
    Magenta = 5,
    Cyan = 6,
    White = 7,
    Reset = 8,
}

impl BaseColor {
    pub const ALL: [BaseColor; 9] = [
        BaseColor::Black,
        BaseColor::Red,
        BaseColor::Green,
        BaseColor::Yellow,
        BaseColor::Blue,
        BaseColor::Magenta,
        BaseColor::Cyan,
        BaseColor::White,
        BaseColor::Reset,
    ];

    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Color number as the terminal library expects it (-1 for default).
    pub const fn terminal_index(self) -> i16 {
        match self {
            BaseColor::Reset => -1,
            other => other as i16,
        }
    }

    /// Convert to crossterm color
    pub fn to_crossterm(self) -> crossterm::style::Color {
        use crossterm::style::Color;
        match self {
            BaseColor::Black => Color::Black,
            BaseColor::Red => Color::DarkRed,
            BaseColor::Green => Color::DarkGreen,
            BaseColor::Yellow => Color::DarkYellow,
            BaseColor::Blue => Color::DarkBlue,
            BaseColor::Magenta => Color::DarkMagenta,
            BaseColor::Cyan => Color::DarkCyan,
            BaseColor::White => Color::Grey,
            BaseColor::Reset => Color::Reset,
        }
    }
}

/// A (foreground, background) combination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ColorPair {
    pub fg: BaseColor,
    pub bg: BaseColor,
}

impl ColorPair {
    pub const fn new(fg: BaseColor, bg: BaseColor) -> Self {
        Self { fg, bg }
    }

    /// Color-pair identifier registered with the terminal.
    pub const fn id(self) -> i16 {
        self.bg.index() as i16 * 10 + self.fg.index() as i16
    }
}

bitflags! {
    /// Emphasis bits. Bold brightens the foreground, blink the background.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Emphasis: u8 {
        const BOLD  = 0b01;
        const BLINK = 0b10;
    }
}

/// A rendering attribute: an optional color pair plus emphasis.
///
/// `pair == None` renders with the terminal's own default colors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Attr {
    pub pair: Option<ColorPair>,
    pub emphasis: Emphasis,
}

impl Attr {
    pub const NORMAL: Attr = Attr {
        pair: None,
        emphasis: Emphasis::empty(),
    };

    pub const BOLD: Attr = Attr {
        pair: None,
        emphasis: Emphasis::BOLD,
    };

    pub const fn color(fg: BaseColor, bg: BaseColor) -> Self {
        Self {
            pair: Some(ColorPair::new(fg, bg)),
            emphasis: Emphasis::empty(),
        }
    }

    pub const fn bold(self) -> Self {
        Self {
            pair: self.pair,
            emphasis: self.emphasis.union(Emphasis::BOLD),
        }
    }

    pub const fn blink(self) -> Self {
        Self {
            pair: self.pair,
            emphasis: self.emphasis.union(Emphasis::BLINK),
        }
    }

    pub fn pair_id(&self) -> Option<i16> {
        self.pair.map(ColorPair::id)
    }
}

macro_rules! color_elements {
    ($($name:ident),* $(,)?) => {
        /// Semantic rendering roles of the dashboard.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum ColorElement {
            $($name),*
        }

        impl ColorElement {
            pub const ALL: &'static [ColorElement] = &[$(ColorElement::$name),*];
            pub const COUNT: usize = Self::ALL.len();

            pub const fn index(self) -> usize {
                self as usize
            }
        }
    };
}

color_elements! {
    ResetColor,
    DefaultColor,
    FunctionBar,
    FunctionKey,
    PanelHeaderFocus,
    PanelHeaderUnfocus,
    PanelHighlightFocus,
    PanelHighlightUnfocus,
    FailedSearch,
    Uptime,
    Battery,
    LargeNumber,
    MeterText,
    MeterValue,
    Led,
    TasksRunning,
    Process,
    ProcessShadow,
    ProcessTag,
    ProcessMegabytes,
    ProcessBasename,
    ProcessTree,
    ProcessRState,
    ProcessDState,
    ProcessHighPriority,
    ProcessLowPriority,
    ProcessThread,
    ProcessThreadBasename,
    BarBorder,
    BarShadow,
    Swap,
    Graph1,
    Graph2,
    Graph3,
    Graph4,
    Graph5,
    Graph6,
    Graph7,
    Graph8,
    Graph9,
    MemoryUsed,
    MemoryBuffers,
    MemoryBuffersText,
    MemoryCache,
    LoadAverageFifteen,
    LoadAverageFive,
    LoadAverageOne,
    Load,
    HelpBold,
    Clock,
    CheckBox,
    CheckMark,
    CheckText,
    Hostname,
    CpuNice,
    CpuNiceText,
    CpuNormal,
    CpuKernel,
    CpuIowait,
    CpuIrq,
    CpuSoftIrq,
    CpuSteal,
    CpuGuest,
}

/// Color scheme identifier as stored in the configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColorScheme(pub u8);

impl ColorScheme {
    pub const DEFAULT: ColorScheme = ColorScheme(0);
    /// Forced when the terminal reports no color support.
    pub const MONOCHROME: ColorScheme = ColorScheme(1);
}

impl std::fmt::Display for ColorScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fixed role -> attribute table.
pub struct Palette {
    pub name: &'static str,
    entries: &'static [(ColorElement, Attr)],
}

impl Palette {
    /// Palette used for a scheme. Every scheme currently shares the default one.
    pub fn for_scheme(_scheme: ColorScheme) -> &'static Palette {
        &DEFAULT_PALETTE
    }

    pub fn entries(&self) -> &'static [(ColorElement, Attr)] {
        self.entries
    }
}

use BaseColor::{Black, Blue, Cyan, Green, Magenta, Red, Reset, White, Yellow};

const fn c(fg: BaseColor, bg: BaseColor) -> Attr {
    Attr::color(fg, bg)
}

static DEFAULT_PALETTE: Palette = Palette {
    name: "default",
    entries: &[
        (ColorElement::ResetColor, c(Reset, Reset)),
        (ColorElement::DefaultColor, c(Reset, Reset)),
        (ColorElement::FunctionBar, c(Yellow, Reset)),
        (ColorElement::FunctionKey, c(Red, Reset)),
        (ColorElement::PanelHeaderFocus, c(Black, Blue)),
        (ColorElement::PanelHeaderUnfocus, c(Black, Green).blink()),
        (ColorElement::PanelHighlightFocus, c(White, Blue)),
        (ColorElement::PanelHighlightUnfocus, c(Black, Green).blink()),
        (ColorElement::FailedSearch, c(Red, Reset)),
        (ColorElement::Uptime, c(Cyan, Reset).bold()),
        (ColorElement::Battery, c(Cyan, Reset).bold()),
        (ColorElement::LargeNumber, c(Red, Reset).bold()),
        (ColorElement::MeterText, c(White, Reset).bold()),
        (ColorElement::MeterValue, c(White, Reset).bold()),
        (ColorElement::Led, c(Green, Reset)),
        (ColorElement::TasksRunning, c(Green, Reset)),
        (ColorElement::Process, Attr::NORMAL),
        (ColorElement::ProcessShadow, c(Green, Reset).bold()),
        (ColorElement::ProcessTag, c(Yellow, Reset).bold()),
        (ColorElement::ProcessMegabytes, c(Cyan, Reset)),
        (ColorElement::ProcessBasename, c(Blue, Reset)),
        (ColorElement::ProcessTree, c(Green, Reset).bold()),
        (ColorElement::ProcessRState, c(Green, Reset)),
        (ColorElement::ProcessDState, c(Red, Reset).bold()),
        (ColorElement::ProcessHighPriority, c(Red, Reset)),
        (ColorElement::ProcessLowPriority, c(Red, Reset)),
        (ColorElement::ProcessThread, c(Green, Reset)),
        (ColorElement::ProcessThreadBasename, c(Green, Reset).bold()),
        (ColorElement::BarBorder, Attr::BOLD),
        (ColorElement::BarShadow, Attr::NORMAL),
        (ColorElement::Swap, c(Red, Reset)),
        (ColorElement::Graph1, c(Red, Reset).bold()),
        (ColorElement::Graph2, c(Red, Reset)),
        (ColorElement::Graph3, c(Yellow, Reset).bold()),
        (ColorElement::Graph4, c(Green, Reset).bold()),
        (ColorElement::Graph5, c(Green, Reset)),
        (ColorElement::Graph6, c(Cyan, Reset)),
        (ColorElement::Graph7, c(Blue, Reset).bold()),
        (ColorElement::Graph8, c(Blue, Reset)),
        (ColorElement::Graph9, c(Reset, Reset).bold()),
        (ColorElement::MemoryUsed, c(Green, Reset)),
        (ColorElement::MemoryBuffers, c(Blue, Reset)),
        (ColorElement::MemoryBuffersText, c(Blue, Reset).bold()),
        (ColorElement::MemoryCache, c(Yellow, Reset)),
        (ColorElement::LoadAverageFifteen, c(White, Reset).bold()),
        (ColorElement::LoadAverageFive, c(Reset, Reset)),
        (ColorElement::LoadAverageOne, c(Green, Reset).bold()),
        (ColorElement::Load, Attr::BOLD),
        (ColorElement::HelpBold, c(Cyan, Reset).bold()),
        (ColorElement::Clock, Attr::BOLD),
        (ColorElement::CheckBox, c(Cyan, Reset)),
        (ColorElement::CheckMark, Attr::BOLD),
        (ColorElement::CheckText, Attr::NORMAL),
        (ColorElement::Hostname, Attr::BOLD),
        (ColorElement::CpuNice, c(Blue, Reset)),
        (ColorElement::CpuNiceText, c(Blue, Reset).bold()),
        (ColorElement::CpuNormal, c(Green, Reset)),
        (ColorElement::CpuKernel, c(Red, Reset)),
        (ColorElement::CpuIowait, c(Reset, Reset).bold()),
        (ColorElement::CpuIrq, c(Yellow, Reset)),
        (ColorElement::CpuSoftIrq, c(Magenta, Reset)),
        (ColorElement::CpuSteal, c(Cyan, Reset)),
        (ColorElement::CpuGuest, c(Cyan, Reset)),
    ],
};

/// One registered color pair, in terminal-library numbering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegisteredPair {
    pub id: i16,
    pub fg: i16,
    pub bg: i16,
}

/// The full 9x9 pair matrix plus the role table for one scheme.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColorRegistry {
    scheme: ColorScheme,
    /// Indexed `[fg][bg]`.
    pairs: [[RegisteredPair; 9]; 9],
    roles: [Attr; ColorElement::COUNT],
}

impl ColorRegistry {
    /// Build a registry from scratch for `scheme`.
    pub fn build(scheme: ColorScheme) -> Self {
        let empty = RegisteredPair { id: 0, fg: 0, bg: 0 };
        let mut pairs = [[empty; 9]; 9];
        for fg in BaseColor::ALL {
            for bg in BaseColor::ALL {
                pairs[fg.index() as usize][bg.index() as usize] = RegisteredPair {
                    id: ColorPair::new(fg, bg).id(),
                    fg: fg.terminal_index(),
                    bg: bg.terminal_index(),
                };
            }
        }

        let mut roles = [Attr::NORMAL; ColorElement::COUNT];
        for (role, attr) in Palette::for_scheme(scheme).entries() {
            roles[role.index()] = *attr;
        }

        Self { scheme, pairs, roles }
    }

    pub fn scheme(&self) -> ColorScheme {
        self.scheme
    }

    pub fn pair(&self, fg: BaseColor, bg: BaseColor) -> RegisteredPair {
        self.pairs[fg.index() as usize][bg.index() as usize]
    }

    /// All 81 pairs, foreground-major.
    pub fn pairs(&self) -> impl Iterator<Item = RegisteredPair> + '_ {
        self.pairs.iter().flat_map(|row| row.iter().copied())
    }

    pub fn attr(&self, role: ColorElement) -> Attr {
        self.roles[role.index()]
    }
}

impl std::ops::Index<ColorElement> for ColorRegistry {
    type Output = Attr;

    fn index(&self, role: ColorElement) -> &Attr {
        &self.roles[role.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_id_formula() {
        let registry = ColorRegistry::build(ColorScheme::DEFAULT);
        for fg in BaseColor::ALL {
            for bg in BaseColor::ALL {
                let pair = registry.pair(fg, bg);
                assert_eq!(pair.id, bg.index() as i16 * 10 + fg.index() as i16);
            }
        }
        assert_eq!(registry.pairs().count(), 81);
    }

    #[test]
    fn test_reset_maps_to_terminal_default() {
        let registry = ColorRegistry::build(ColorScheme::DEFAULT);
        let pair = registry.pair(BaseColor::Reset, BaseColor::Blue);
        assert_eq!(pair, RegisteredPair { id: 48, fg: -1, bg: 4 });

        let pair = registry.pair(BaseColor::Yellow, BaseColor::Reset);
        assert_eq!(pair, RegisteredPair { id: 83, fg: 3, bg: -1 });
    }

    #[test]
    fn test_rebuild_is_stable() {
        let first = ColorRegistry::build(ColorScheme::DEFAULT);
        let second = ColorRegistry::build(ColorScheme::DEFAULT);
        assert_eq!(first, second);
    }

    #[test]
    fn test_palette_covers_every_role() {
        let entries = Palette::for_scheme(ColorScheme::DEFAULT).entries();
        assert_eq!(entries.len(), ColorElement::COUNT);
        for role in ColorElement::ALL {
            assert!(entries.iter().any(|(r, _)| r == role), "{:?} missing", role);
        }
    }

    #[test]
    fn test_role_attributes() {
        let registry = ColorRegistry::build(ColorScheme::DEFAULT);

        let header = registry.attr(ColorElement::PanelHeaderUnfocus);
        assert_eq!(header.pair, Some(ColorPair::new(BaseColor::Black, BaseColor::Green)));
        assert_eq!(header.emphasis, Emphasis::BLINK);

        let d_state = registry[ColorElement::ProcessDState];
        assert_eq!(d_state.pair_id(), Some(81));
        assert!(d_state.emphasis.contains(Emphasis::BOLD));

        assert_eq!(registry.attr(ColorElement::Process), Attr::NORMAL);
        assert_eq!(registry.attr(ColorElement::Clock), Attr::BOLD);
    }
}
