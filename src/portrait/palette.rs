//! Keyword tables that turn a free-text description into portrait choices.
//!
//! Every table is evaluated top to bottom and the first rule with a keyword
//! contained in the lowercased description wins. Matching is plain substring
//! search, so table order is the only tie-break.

use image::Rgba;

pub type Rgb = [u8; 3];

pub struct KeywordRule<T> {
    pub keywords: &'static [&'static str],
    pub value: T,
}

const fn rule<T>(keywords: &'static [&'static str], value: T) -> KeywordRule<T> {
    KeywordRule { keywords, value }
}

pub fn first_match<T: Copy>(text: &str, rules: &[KeywordRule<T>], default: T) -> T {
    rules
        .iter()
        .find(|rule| rule.keywords.iter().any(|keyword| text.contains(keyword)))
        .map(|rule| rule.value)
        .unwrap_or(default)
}

pub fn any_keyword(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| text.contains(keyword))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HairShade {
    Golden,
    Black,
    Auburn,
    Platinum,
    Pink,
    Blue,
    Green,
    Violet,
    Brunette,
    LightBrown,
    MidBrown,
}

impl HairShade {
    pub fn rgb(self) -> Rgb {
        match self {
            HairShade::Golden => [255, 215, 0],
            HairShade::Black => [26, 26, 26],
            HairShade::Auburn => [165, 42, 42],
            HairShade::Platinum => [229, 228, 226],
            HairShade::Pink => [255, 105, 180],
            HairShade::Blue => [65, 105, 225],
            HairShade::Green => [46, 139, 87],
            HairShade::Violet => [138, 43, 226],
            HairShade::Brunette => [92, 58, 33],
            HairShade::LightBrown => [160, 82, 45],
            HairShade::MidBrown => [139, 69, 19],
        }
    }
}

pub const HAIR_RULES: &[KeywordRule<HairShade>] = &[
    rule(&["blonde", "blond", "golden"], HairShade::Golden),
    rule(&["black", "dark"], HairShade::Black),
    rule(&["red", "ginger", "auburn"], HairShade::Auburn),
    rule(&["silver", "white", "platinum"], HairShade::Platinum),
    rule(&["pink"], HairShade::Pink),
    rule(&["blue"], HairShade::Blue),
    rule(&["green"], HairShade::Green),
    rule(&["purple", "violet"], HairShade::Violet),
    rule(&["brown", "brunette"], HairShade::Brunette),
    rule(&["chestnut", "tawny"], HairShade::LightBrown),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkinTone {
    Tan,
    Dark,
    Pale,
    Caramel,
    Ebony,
    Light,
}

impl SkinTone {
    pub fn rgb(self) -> Rgb {
        match self {
            SkinTone::Tan => [210, 166, 121],
            SkinTone::Dark => [141, 85, 36],
            SkinTone::Pale => [255, 228, 214],
            SkinTone::Caramel => [198, 142, 90],
            SkinTone::Ebony => [90, 58, 41],
            SkinTone::Light => [245, 213, 184],
        }
    }
}

pub const SKIN_RULES: &[KeywordRule<SkinTone>] = &[
    rule(&["tan", "olive"], SkinTone::Tan),
    rule(&["dark skin", "dark-skinned", "black skin"], SkinTone::Dark),
    rule(&["pale", "fair"], SkinTone::Pale),
    rule(&["caramel", "honey"], SkinTone::Caramel),
    rule(&["ebony"], SkinTone::Ebony),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outfit {
    Cheerleader,
    Goth,
    Uniform,
    Casual,
    Business,
    Mature,
    Punk,
    Nerd,
    Bright,
}

impl Outfit {
    pub fn rgb(self) -> Rgb {
        match self {
            Outfit::Cheerleader => [255, 140, 0],
            Outfit::Goth => [43, 43, 43],
            Outfit::Uniform => [30, 58, 138],
            Outfit::Casual => [70, 130, 180],
            Outfit::Business => [54, 69, 79],
            Outfit::Mature => [128, 0, 32],
            Outfit::Punk => [178, 34, 34],
            Outfit::Nerd => [85, 107, 47],
            Outfit::Bright => [255, 20, 147],
        }
    }
}

pub const OUTFIT_RULES: &[KeywordRule<Outfit>] = &[
    rule(&["cheerleader"], Outfit::Cheerleader),
    rule(&["emo", "goth"], Outfit::Goth),
    rule(&["uniform"], Outfit::Uniform),
    rule(&["casual"], Outfit::Casual),
    rule(&["business", "professional"], Outfit::Business),
    rule(&["milf", "mature"], Outfit::Mature),
    rule(&["punk"], Outfit::Punk),
    rule(&["nerd", "bookworm"], Outfit::Nerd),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mood {
    Soft,
    Warm,
    Dark,
    Neutral,
}

impl Mood {
    /// Gradient colours, centre first.
    pub fn gradient(self) -> (Rgb, Rgb) {
        match self {
            Mood::Soft => ([255, 209, 220], [176, 224, 230]),
            Mood::Warm => ([255, 99, 71], [255, 105, 180]),
            Mood::Dark => ([75, 0, 130], [10, 10, 10]),
            Mood::Neutral => ([240, 240, 240], [64, 64, 64]),
        }
    }
}

pub const MOOD_RULES: &[KeywordRule<Mood>] = &[
    rule(&["shy", "innocent"], Mood::Soft),
    rule(&["wild", "bold"], Mood::Warm),
    rule(&["goth", "emo"], Mood::Dark),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HairStyle {
    Long,
    Short,
    Mohawk,
    Medium,
}

pub const HAIR_STYLE_RULES: &[KeywordRule<HairStyle>] = &[
    rule(&["long", "flowing"], HairStyle::Long),
    rule(&["short", "pixie"], HairStyle::Short),
    rule(&["punk", "mohawk"], HairStyle::Mohawk),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LipColor {
    Purple,
    PalePink,
    Magenta,
}

impl LipColor {
    pub fn rgb(self) -> Rgb {
        match self {
            LipColor::Purple => [106, 13, 173],
            LipColor::PalePink => [244, 166, 184],
            LipColor::Magenta => [199, 21, 133],
        }
    }
}

pub const LIP_RULES: &[KeywordRule<LipColor>] = &[
    rule(&["goth", "emo"], LipColor::Purple),
    rule(&["innocent", "natural"], LipColor::PalePink),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Figure {
    Standard,
    Mature,
}

pub const FIGURE_RULES: &[KeywordRule<Figure>] = &[rule(&["mature", "milf"], Figure::Mature)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutfitAccent {
    CheerStripe,
    BusinessCollar,
}

pub const ACCENT_RULES: &[KeywordRule<OutfitAccent>] = &[
    rule(&["cheerleader"], OutfitAccent::CheerStripe),
    rule(&["business", "professional"], OutfitAccent::BusinessCollar),
];

pub const GLASSES_KEYWORDS: &[&str] = &["nerd", "bookworm"];
pub const EARRING_KEYWORDS: &[&str] = &["punk", "rebel"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortraitPalette {
    pub hair: HairShade,
    pub skin: SkinTone,
    pub outfit: Outfit,
    pub mood: Mood,
    pub hair_style: HairStyle,
    pub lips: LipColor,
    pub figure: Figure,
    pub accent: Option<OutfitAccent>,
    pub glasses: bool,
    pub earrings: bool,
}

pub fn derive_palette(description: &str) -> PortraitPalette {
    let text = description.to_lowercase();
    let accent = ACCENT_RULES
        .iter()
        .find(|rule| any_keyword(&text, rule.keywords))
        .map(|rule| rule.value);

    PortraitPalette {
        hair: first_match(&text, HAIR_RULES, HairShade::MidBrown),
        skin: first_match(&text, SKIN_RULES, SkinTone::Light),
        outfit: first_match(&text, OUTFIT_RULES, Outfit::Bright),
        mood: first_match(&text, MOOD_RULES, Mood::Neutral),
        hair_style: first_match(&text, HAIR_STYLE_RULES, HairStyle::Medium),
        lips: first_match(&text, LIP_RULES, LipColor::Magenta),
        figure: first_match(&text, FIGURE_RULES, Figure::Standard),
        accent,
        glasses: any_keyword(&text, GLASSES_KEYWORDS),
        earrings: any_keyword(&text, EARRING_KEYWORDS),
    }
}

pub fn opaque(rgb: Rgb) -> Rgba<u8> {
    Rgba([rgb[0], rgb[1], rgb[2], 255])
}

pub fn with_alpha(rgb: Rgb, alpha: u8) -> Rgba<u8> {
    Rgba([rgb[0], rgb[1], rgb[2], alpha])
}
