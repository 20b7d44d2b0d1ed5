//! Fonts for the invisible text layer
//!
//! The layer is never painted, so the font only has to give viewers correct
//! Unicode for copy/paste and sensible glyph advances for selection. The
//! standard non-embedded CJK CID fonts with UTF-16 CMaps cover both: every
//! conforming reader knows them and they accept any BMP or astral text.

use lopdf::{dictionary, Document, Object, ObjectId};

/// Predefined CJK font used for the text layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CjkFont {
    /// Simplified Chinese (also used for Latin-only text)
    #[default]
    ChinaS,
    /// Traditional Chinese
    ChinaT,
    Japan,
    Korea,
}

impl CjkFont {
    /// Pick a font from a Tesseract language string such as `chi_tra+eng`
    ///
    /// The first CJK language wins; anything else gets the simplified
    /// Chinese font.
    pub fn for_language(language: &str) -> Self {
        language
            .split('+')
            .find_map(|lang| match lang.trim() {
                "chi_sim" | "chi_sim_vert" | "ch" => Some(Self::ChinaS),
                "chi_tra" | "chi_tra_vert" | "chinese_cht" => Some(Self::ChinaT),
                "jpn" | "jpn_vert" | "japan" => Some(Self::Japan),
                "kor" | "kor_vert" | "korean" => Some(Self::Korea),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub fn base_font(&self) -> &'static str {
        match self {
            Self::ChinaS => "STSong-Light",
            Self::ChinaT => "MSung-Light",
            Self::Japan => "HeiseiMin-W3",
            Self::Korea => "HYSMyeongJo-Medium",
        }
    }

    fn ordering(&self) -> &'static str {
        match self {
            Self::ChinaS => "GB1",
            Self::ChinaT => "CNS1",
            Self::Japan => "Japan1",
            Self::Korea => "Korea1",
        }
    }

    fn supplement(&self) -> i64 {
        match self {
            Self::Korea => 2,
            _ => 4,
        }
    }

    fn encoding(&self) -> &'static str {
        match self {
            Self::ChinaS => "UniGB-UTF16-H",
            Self::ChinaT => "UniCNS-UTF16-H",
            Self::Japan => "UniJIS-UTF16-H",
            Self::Korea => "UniKS-UTF16-H",
        }
    }

    /// Add the Type0 font (with descendant and descriptor) to a document
    pub fn add_to(&self, doc: &mut Document) -> ObjectId {
        let descriptor_id = doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => self.base_font(),
            "Flags" => 6,
            "FontBBox" => vec![(-25).into(), (-254).into(), 1000.into(), 880.into()],
            "ItalicAngle" => 0,
            "Ascent" => 880,
            "Descent" => -120,
            "CapHeight" => 880,
            "StemV" => 93,
        });

        // Printable ASCII sits at CIDs 1..=95 in every Adobe CJK collection
        let widths: Vec<Object> = vec![1.into(), 95.into(), 500.into()];

        let cid_font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType0",
            "BaseFont" => self.base_font(),
            "CIDSystemInfo" => dictionary! {
                "Registry" => Object::string_literal("Adobe"),
                "Ordering" => Object::string_literal(self.ordering()),
                "Supplement" => self.supplement(),
            },
            "FontDescriptor" => descriptor_id,
            "DW" => 1000,
            "W" => widths,
        });

        doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => self.base_font(),
            "Encoding" => self.encoding(),
            "DescendantFonts" => vec![cid_font_id.into()],
        })
    }
}

/// Advance of a single character at font size 1
pub fn char_advance(c: char) -> f32 {
    if (' '..='~').contains(&c) {
        0.5
    } else {
        1.0
    }
}

/// Advance of a string at font size 1
pub fn text_advance(text: &str) -> f32 {
    text.chars().map(char_advance).sum()
}

/// Encode text for the UTF-16 CMaps (big endian, surrogate pairs kept)
pub fn encode_utf16be(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(|unit| unit.to_be_bytes()).collect()
}
