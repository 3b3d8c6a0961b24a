//! Korean particle selection.
//!
//! Particles such as 을/를 have one form after a syllable that ends in a
//! consonant (받침) and another after a vowel. The choice is made from the
//! last character of the preceding word by decomposing the Hangul syllable
//! block into lead, vowel and trail jamo.
//!
//! ```
//! use formfill::compose::Particle;
//!
//! assert_eq!(Particle::Object.attach("김응태").unwrap(), "김응태를");
//! assert_eq!(Particle::Object.attach("홍길동").unwrap(), "홍길동을");
//! assert_eq!(Particle::Topic.attach("서울").unwrap(), "서울은");
//! ```

use crate::error::{FormfillError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

const SYLLABLE_FIRST: u32 = 0xAC00;
const SYLLABLE_LAST: u32 = 0xD7A3;
const TRAIL_COUNT: u32 = 28;
const VOWEL_COUNT: u32 = 21;
/// Trail index of ㄹ
const TRAIL_RIEUL: u32 = 8;

/// How the last character of a word ends, phonetically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    /// Hangul syllable with a trailing consonant; `rieul` when it is ㄹ
    Consonant { rieul: bool },
    /// Hangul syllable without a trailing consonant
    Vowel,
    /// Digits, Latin letters, punctuation and any other character
    Other,
}

/// Lead, vowel and trail indices of a precomposed Hangul syllable.
pub fn decompose(c: char) -> Option<(u32, u32, u32)> {
    let code = u32::from(c);
    if !(SYLLABLE_FIRST..=SYLLABLE_LAST).contains(&code) {
        return None;
    }
    let offset = code - SYLLABLE_FIRST;
    let lead = offset / (VOWEL_COUNT * TRAIL_COUNT);
    let vowel = (offset % (VOWEL_COUNT * TRAIL_COUNT)) / TRAIL_COUNT;
    let trail = offset % TRAIL_COUNT;
    Some((lead, vowel, trail))
}

pub fn ending_of(c: char) -> Ending {
    match decompose(c) {
        Some((_, _, 0)) => Ending::Vowel,
        Some((_, _, trail)) => Ending::Consonant {
            rieul: trail == TRAIL_RIEUL,
        },
        None => Ending::Other,
    }
}

/// A two-allomorph particle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Particle {
    /// 을/를
    Object,
    /// 은/는
    Topic,
    /// 이/가
    Subject,
    /// 과/와
    Comitative,
    /// 으로/로; ㄹ-final words take 로
    Directional,
    /// Any other pair, written `consonant/vowel`
    Custom { consonant: String, vowel: String },
}

impl Particle {
    /// (form after a consonant, form after a vowel)
    pub fn forms(&self) -> (&str, &str) {
        match self {
            Self::Object => ("을", "를"),
            Self::Topic => ("은", "는"),
            Self::Subject => ("이", "가"),
            Self::Comitative => ("과", "와"),
            Self::Directional => ("으로", "로"),
            Self::Custom { consonant, vowel } => (consonant, vowel),
        }
    }

    /// Picks the form that follows `word`.
    ///
    /// Words that do not end in a Hangul syllable take the vowel form. Trailing
    /// whitespace is ignored.
    ///
    /// # Errors
    ///
    /// [`FormfillError::InvalidSuffixTarget`] when `word` is empty or blank.
    pub fn select(&self, word: &str) -> Result<&str> {
        let last = word
            .trim_end()
            .chars()
            .next_back()
            .ok_or(FormfillError::InvalidSuffixTarget)?;
        let (consonant, vowel) = self.forms();
        Ok(match (ending_of(last), self) {
            (Ending::Consonant { rieul: true }, Self::Directional) => vowel,
            (Ending::Consonant { .. }, _) => consonant,
            (Ending::Vowel | Ending::Other, _) => vowel,
        })
    }

    /// `word` followed directly by the selected form.
    ///
    /// # Errors
    ///
    /// See [`Particle::select`].
    pub fn attach(&self, word: &str) -> Result<String> {
        let form = self.select(word)?;
        let word = word.trim_end();
        Ok(format!("{word}{form}"))
    }
}

impl FromStr for Particle {
    type Err = FormfillError;

    /// Accepts either form (`"을"`, `"를"`), the pair (`"을/를"`) or the
    /// pair name (`"object"`). Other `a/b` pairs become [`Particle::Custom`].
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let known = match s {
            "을" | "를" | "을/를" | "object" => Some(Self::Object),
            "은" | "는" | "은/는" | "topic" => Some(Self::Topic),
            "이" | "가" | "이/가" | "subject" => Some(Self::Subject),
            "과" | "와" | "과/와" | "comitative" => Some(Self::Comitative),
            "으로" | "로" | "으로/로" | "directional" => Some(Self::Directional),
            _ => None,
        };
        if let Some(particle) = known {
            return Ok(particle);
        }
        match s.split_once('/') {
            Some((consonant, vowel)) if !consonant.is_empty() && !vowel.is_empty() => {
                Ok(Self::Custom {
                    consonant: consonant.to_owned(),
                    vowel: vowel.to_owned(),
                })
            }
            _ => Err(FormfillError::Configuration(format!(
                "unknown particle '{s}' (use a form such as '을' or a pair such as '이랑/랑')"
            ))),
        }
    }
}

impl TryFrom<String> for Particle {
    type Error = FormfillError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Particle> for String {
    fn from(particle: Particle) -> Self {
        let (consonant, vowel) = particle.forms();
        format!("{consonant}/{vowel}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decompose() {
        assert_eq!(decompose('가'), Some((0, 0, 0)));
        assert_eq!(decompose('힣'), Some((18, 20, 27)));
        assert_eq!(decompose('a'), None);
        assert_eq!(ending_of('길'), Ending::Consonant { rieul: true });
        assert_eq!(ending_of('동'), Ending::Consonant { rieul: false });
        assert_eq!(ending_of('태'), Ending::Vowel);
        assert_eq!(ending_of('7'), Ending::Other);
    }

    #[test]
    fn test_object_marker() {
        assert_eq!(Particle::Object.select("홍길동").unwrap(), "을");
        assert_eq!(Particle::Object.select("김응태").unwrap(), "를");
    }

    #[test]
    fn test_all_pairs() {
        assert_eq!(Particle::Topic.attach("학교").unwrap(), "학교는");
        assert_eq!(Particle::Subject.attach("책").unwrap(), "책이");
        assert_eq!(Particle::Subject.attach("나무").unwrap(), "나무가");
        assert_eq!(Particle::Comitative.attach("빵").unwrap(), "빵과");
        assert_eq!(Particle::Comitative.attach("우유").unwrap(), "우유와");
        assert_eq!(Particle::Directional.attach("부산").unwrap(), "부산으로");
        assert_eq!(Particle::Directional.attach("서울").unwrap(), "서울로");
        assert_eq!(Particle::Directional.attach("학교").unwrap(), "학교로");
    }

    #[test]
    fn test_fallback_for_non_hangul() {
        assert_eq!(Particle::Object.attach("ABC").unwrap(), "ABC를");
        assert_eq!(Particle::Object.attach("제3").unwrap(), "제3를");
        assert_eq!(Particle::Topic.attach("(주)").unwrap(), "(주)는");
    }

    #[test]
    fn test_trailing_whitespace_is_ignored() {
        assert_eq!(Particle::Object.attach("홍길동  ").unwrap(), "홍길동을");
    }

    #[test]
    fn test_empty_word_is_rejected() {
        assert!(matches!(
            Particle::Object.select(""),
            Err(FormfillError::InvalidSuffixTarget)
        ));
        assert!(matches!(
            Particle::Topic.attach("   "),
            Err(FormfillError::InvalidSuffixTarget)
        ));
    }

    #[test]
    fn test_parse_selectors() {
        assert_eq!("을".parse::<Particle>().unwrap(), Particle::Object);
        assert_eq!("를".parse::<Particle>().unwrap(), Particle::Object);
        assert_eq!("topic".parse::<Particle>().unwrap(), Particle::Topic);
        assert_eq!(
            "이랑/랑".parse::<Particle>().unwrap(),
            Particle::Custom {
                consonant: "이랑".to_owned(),
                vowel: "랑".to_owned()
            }
        );
        assert!("xyz".parse::<Particle>().is_err());
        assert!("/를".parse::<Particle>().is_err());
    }

    #[test]
    fn test_serde_uses_pair_text() {
        let json = serde_json::to_string(&Particle::Object).unwrap();
        assert_eq!(json, "\"을/를\"");
        let back: Particle = serde_json::from_str("\"는\"").unwrap();
        assert_eq!(back, Particle::Topic);
    }

    fn syllable(trail: u32) -> impl Strategy<Value = char> {
        (0_u32..19, 0_u32..21).prop_map(move |(lead, vowel)| {
            char::from_u32(SYLLABLE_FIRST + (lead * 21 + vowel) * 28 + trail).unwrap_or('가')
        })
    }

    proptest! {
        #[test]
        fn prop_consonant_final_takes_consonant_form(prefix in "\\PC{0,8}", last in (1_u32..28).prop_flat_map(syllable)) {
            let word = format!("{prefix}{last}");
            prop_assert_eq!(Particle::Object.select(&word).unwrap(), "을");
            prop_assert_eq!(Particle::Topic.select(&word).unwrap(), "은");
        }

        #[test]
        fn prop_vowel_final_takes_vowel_form(prefix in "\\PC{0,8}", last in syllable(0)) {
            let word = format!("{prefix}{last}");
            prop_assert_eq!(Particle::Object.select(&word).unwrap(), "를");
            prop_assert_eq!(Particle::Subject.select(&word).unwrap(), "가");
        }

        #[test]
        fn prop_selection_is_deterministic(word in "\\PC{1,12}") {
            let first = Particle::Object.select(&word).map(str::to_owned).ok();
            let second = Particle::Object.select(&word).map(str::to_owned).ok();
            prop_assert_eq!(first, second);
        }
    }
}
