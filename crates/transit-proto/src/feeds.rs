//! Feed partitions and route codes.
//!
//! Both are closed enums with exhaustive tables. Anything the tables do not
//! list is rejected with [`UnknownKey`] instead of falling back to a default.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnknownKey {
    #[error("unknown feed key: {0:?}")]
    Feed(String),
    #[error("unknown route code: {0:?}")]
    Route(String),
}

/// One remote partition of the station collection (one per line group).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum FeedKey {
    /// 1, 2, 3, 4, 5, 6 and the 42 St shuttle.
    #[default]
    #[serde(rename = "1")]
    Numbered,
    #[serde(rename = "ace")]
    Ace,
    #[serde(rename = "bdfm")]
    Bdfm,
    #[serde(rename = "g")]
    G,
    #[serde(rename = "jz")]
    Jz,
    #[serde(rename = "nqrw")]
    Nqrw,
    #[serde(rename = "l")]
    L,
    #[serde(rename = "7")]
    Seven,
    #[serde(rename = "si")]
    StatenIsland,
}

impl FeedKey {
    pub const ALL: [FeedKey; 9] = [
        FeedKey::Numbered,
        FeedKey::Ace,
        FeedKey::Bdfm,
        FeedKey::G,
        FeedKey::Jz,
        FeedKey::Nqrw,
        FeedKey::L,
        FeedKey::Seven,
        FeedKey::StatenIsland,
    ];

    /// Path segment used in `GET /api/stations/{feed}`.
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedKey::Numbered => "1",
            FeedKey::Ace => "ace",
            FeedKey::Bdfm => "bdfm",
            FeedKey::G => "g",
            FeedKey::Jz => "jz",
            FeedKey::Nqrw => "nqrw",
            FeedKey::L => "l",
            FeedKey::Seven => "7",
            FeedKey::StatenIsland => "si",
        }
    }

    /// Routes carried by this feed.
    pub fn routes(&self) -> &'static [Route] {
        match self {
            FeedKey::Numbered => &[
                Route::One,
                Route::Two,
                Route::Three,
                Route::Four,
                Route::Five,
                Route::Six,
                Route::S,
            ],
            FeedKey::Ace => &[Route::A, Route::C, Route::E],
            FeedKey::Bdfm => &[Route::B, Route::D, Route::F, Route::M],
            FeedKey::G => &[Route::G],
            FeedKey::Jz => &[Route::J, Route::Z],
            FeedKey::Nqrw => &[Route::N, Route::Q, Route::R, Route::W],
            FeedKey::L => &[Route::L],
            FeedKey::Seven => &[Route::Seven],
            FeedKey::StatenIsland => &[Route::Si],
        }
    }
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedKey {
    type Err = UnknownKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        FeedKey::ALL
            .iter()
            .copied()
            .find(|k| k.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownKey::Feed(s.to_string()))
    }
}

/// A service (line) code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Route {
    One,
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    J,
    L,
    M,
    N,
    Q,
    R,
    W,
    Z,
    /// 42 St shuttle.
    S,
    /// Staten Island Railway.
    Si,
}

impl Route {
    pub const ALL: [Route; 24] = [
        Route::One,
        Route::Two,
        Route::Three,
        Route::Four,
        Route::Five,
        Route::Six,
        Route::Seven,
        Route::A,
        Route::B,
        Route::C,
        Route::D,
        Route::E,
        Route::F,
        Route::G,
        Route::J,
        Route::L,
        Route::M,
        Route::N,
        Route::Q,
        Route::R,
        Route::W,
        Route::Z,
        Route::S,
        Route::Si,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Route::One => "1",
            Route::Two => "2",
            Route::Three => "3",
            Route::Four => "4",
            Route::Five => "5",
            Route::Six => "6",
            Route::Seven => "7",
            Route::A => "A",
            Route::B => "B",
            Route::C => "C",
            Route::D => "D",
            Route::E => "E",
            Route::F => "F",
            Route::G => "G",
            Route::J => "J",
            Route::L => "L",
            Route::M => "M",
            Route::N => "N",
            Route::Q => "Q",
            Route::R => "R",
            Route::W => "W",
            Route::Z => "Z",
            Route::S => "S",
            Route::Si => "SI",
        }
    }

    /// The feed that carries this route.
    pub fn feed(&self) -> FeedKey {
        match self {
            Route::One | Route::Two | Route::Three | Route::Four | Route::Five | Route::Six
            | Route::S => FeedKey::Numbered,
            Route::Seven => FeedKey::Seven,
            Route::A | Route::C | Route::E => FeedKey::Ace,
            Route::B | Route::D | Route::F | Route::M => FeedKey::Bdfm,
            Route::G => FeedKey::G,
            Route::J | Route::Z => FeedKey::Jz,
            Route::L => FeedKey::L,
            Route::N | Route::Q | Route::R | Route::W => FeedKey::Nqrw,
            Route::Si => FeedKey::StatenIsland,
        }
    }

    /// Stem of the route bullet asset, e.g. `"a-letter"` for
    /// `subway_icons/a-letter.256x256.png`.
    pub fn icon_stem(&self) -> &'static str {
        match self {
            Route::One => "1-digit",
            Route::Two => "2-digit",
            Route::Three => "3-digit",
            Route::Four => "4-digit",
            Route::Five => "5-digit",
            Route::Six => "6-digit",
            Route::Seven => "7-digit",
            Route::A => "a-letter",
            Route::B => "b-letter",
            Route::C => "c-letter",
            Route::D => "d-letter",
            Route::E => "e-letter",
            Route::F => "f-letter",
            Route::G => "g-letter",
            Route::J => "j-letter",
            Route::L => "l-letter",
            Route::M => "m-letter",
            Route::N => "n-letter",
            Route::Q => "q-letter",
            Route::R => "r-letter",
            Route::W => "w-letter",
            Route::Z => "z-letter",
            Route::S => "s-letter",
            Route::Si => "sir-letter",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Route {
    type Err = UnknownKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Route::ALL
            .iter()
            .copied()
            .find(|r| r.code().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownKey::Route(s.to_string()))
    }
}
