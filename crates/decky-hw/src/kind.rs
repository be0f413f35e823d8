//! Supported panel models.
//!
//! Geometry comes from `elgato_streamdeck::info::Kind`; this type only
//! narrows it to panels with key displays and gives them stable names.

use elgato_streamdeck::info::Kind;
use std::str::FromStr;

/// Stream Deck model with LCD keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeckKind {
    Original,
    OriginalV2,
    Mini,
    MiniMk2,
    Mk2,
    Mk2Scissor,
    Xl,
    XlV2,
    Plus,
    Neo,
}

impl DeckKind {
    /// Every model with key displays.
    pub const ALL: [DeckKind; 10] = [
        DeckKind::Original,
        DeckKind::OriginalV2,
        DeckKind::Mini,
        DeckKind::MiniMk2,
        DeckKind::Mk2,
        DeckKind::Mk2Scissor,
        DeckKind::Xl,
        DeckKind::XlV2,
        DeckKind::Plus,
        DeckKind::Neo,
    ];

    /// Maps a library model to ours. Panels without key screens map to `None`.
    #[allow(unreachable_patterns)]
    pub fn from_streamdeck(kind: Kind) -> Option<Self> {
        match kind {
            Kind::Original => Some(DeckKind::Original),
            Kind::OriginalV2 => Some(DeckKind::OriginalV2),
            Kind::Mini => Some(DeckKind::Mini),
            Kind::MiniMk2 => Some(DeckKind::MiniMk2),
            Kind::Mk2 => Some(DeckKind::Mk2),
            Kind::Mk2Scissor => Some(DeckKind::Mk2Scissor),
            Kind::Xl => Some(DeckKind::Xl),
            Kind::XlV2 => Some(DeckKind::XlV2),
            Kind::Plus => Some(DeckKind::Plus),
            Kind::Neo => Some(DeckKind::Neo),
            _ => None,
        }
    }

    /// The library model used to talk to the panel.
    pub fn to_streamdeck(self) -> Kind {
        match self {
            DeckKind::Original => Kind::Original,
            DeckKind::OriginalV2 => Kind::OriginalV2,
            DeckKind::Mini => Kind::Mini,
            DeckKind::MiniMk2 => Kind::MiniMk2,
            DeckKind::Mk2 => Kind::Mk2,
            DeckKind::Mk2Scissor => Kind::Mk2Scissor,
            DeckKind::Xl => Kind::Xl,
            DeckKind::XlV2 => Kind::XlV2,
            DeckKind::Plus => Kind::Plus,
            DeckKind::Neo => Kind::Neo,
        }
    }

    /// Number of LCD keys.
    pub fn key_count(&self) -> usize {
        self.to_streamdeck().key_count() as usize
    }

    /// Key columns in the grid.
    pub fn columns(&self) -> usize {
        self.to_streamdeck().column_count() as usize
    }

    /// Edge length of a key image in pixels (keys are square).
    pub fn key_size(&self) -> u32 {
        self.to_streamdeck().key_image_format().size.0 as u32
    }
}

impl FromStr for DeckKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_', ' ', '.'], "").as_str() {
            "original" => Ok(DeckKind::Original),
            "originalv2" => Ok(DeckKind::OriginalV2),
            "mini" => Ok(DeckKind::Mini),
            "minimk2" => Ok(DeckKind::MiniMk2),
            "mk2" => Ok(DeckKind::Mk2),
            "mk2scissor" => Ok(DeckKind::Mk2Scissor),
            "xl" => Ok(DeckKind::Xl),
            "xlv2" => Ok(DeckKind::XlV2),
            "plus" => Ok(DeckKind::Plus),
            "neo" => Ok(DeckKind::Neo),
            _ => Err(format!("unknown Stream Deck model: {}", s)),
        }
    }
}

impl std::fmt::Display for DeckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeckKind::Original => write!(f, "Stream Deck Original"),
            DeckKind::OriginalV2 => write!(f, "Stream Deck Original V2"),
            DeckKind::Mini => write!(f, "Stream Deck Mini"),
            DeckKind::MiniMk2 => write!(f, "Stream Deck Mini MK.2"),
            DeckKind::Mk2 => write!(f, "Stream Deck MK.2"),
            DeckKind::Mk2Scissor => write!(f, "Stream Deck MK.2 (scissor)"),
            DeckKind::Xl => write!(f, "Stream Deck XL"),
            DeckKind::XlV2 => write!(f, "Stream Deck XL V2"),
            DeckKind::Plus => write!(f, "Stream Deck +"),
            DeckKind::Neo => write!(f, "Stream Deck Neo"),
        }
    }
}
