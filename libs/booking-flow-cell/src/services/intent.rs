use chrono::Timelike;
use regex::Regex;

use shared_models::{Clinic, ConsultationMode};

use crate::models::SlotOffer;

const YES_WORDS: [&str; 10] = [
    "oui", "ouais", "d accord", "ok", "okay", "yes", "confirme", "confirmer", "c est bon",
    "parfait",
];
const NO_WORDS: [&str; 6] = ["non", "no", "annuler", "stop", "arreter", "pas"];

const VIDEO_WORDS: [&str; 6] = [
    "video", "teleconsultation", "ligne", "distance", "camera", "visio",
];
const IN_PERSON_WORDS: [&str; 6] = [
    "cabinet", "presentiel", "physique", "hopital", "clinique", "sur place",
];

/// Ordinal words and the offer index they designate.
const ORDINALS: [(&str, usize); 8] = [
    ("premier", 0),
    ("premiere", 0),
    ("deuxieme", 1),
    ("second", 1),
    ("seconde", 1),
    ("troisieme", 2),
    ("quatrieme", 3),
    ("cinquieme", 4),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YesNo {
    Yes,
    No,
}

/// Reads French answers out of free-form transcripts.
pub struct IntentParser {
    offer_number: Option<Regex>,
    hour: Option<Regex>,
}

impl Default for IntentParser {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentParser {
    pub fn new() -> Self {
        Self {
            offer_number: Regex::new(r"\b([1-5])\b").ok(),
            hour: Regex::new(r"(\d{1,2})\s*(?:heures?|h)\s*(\d{2})?").ok(),
        }
    }

    pub fn yes_no(&self, transcript: &str) -> Option<YesNo> {
        let text = normalize(transcript);
        if YES_WORDS.iter().any(|w| has_phrase(&text, w)) {
            Some(YesNo::Yes)
        } else if NO_WORDS.iter().any(|w| has_phrase(&text, w)) {
            Some(YesNo::No)
        } else {
            None
        }
    }

    pub fn consultation_mode(&self, transcript: &str) -> Option<ConsultationMode> {
        let text = normalize(transcript);
        if VIDEO_WORDS.iter().any(|w| has_phrase(&text, w)) {
            Some(ConsultationMode::Video)
        } else if IN_PERSON_WORDS.iter().any(|w| has_phrase(&text, w)) {
            Some(ConsultationMode::InPerson)
        } else {
            None
        }
    }

    /// Clinic whose name shares the most significant words with the transcript.
    pub fn match_clinic<'a>(&self, transcript: &str, clinics: &'a [Clinic]) -> Option<&'a Clinic> {
        let text = normalize(transcript);
        let mut best: Option<(&Clinic, usize)> = None;

        for clinic in clinics {
            let name = normalize(&clinic.name);
            if has_phrase(&text, name.trim()) {
                return Some(clinic);
            }
            let score = name
                .split_whitespace()
                .filter(|word| word.chars().count() > 2 && has_phrase(&text, word))
                .count();
            if score > 0 && best.map_or(true, |(_, top)| score > top) {
                best = Some((clinic, score));
            }
        }

        best.map(|(clinic, _)| clinic)
    }

    /// Index into `offers` of the slot the patient named: a weekday with an hour,
    /// an ordinal ("le deuxième") or a bare number.
    pub fn slot_choice(&self, transcript: &str, offers: &[SlotOffer]) -> Option<usize> {
        let text = normalize(transcript);

        if let Some(index) = self.day_and_hour(&text, offers) {
            return Some(index);
        }

        if let Some(index) = ORDINALS
            .iter()
            .find(|(word, _)| has_phrase(&text, word))
            .map(|(_, index)| *index)
        {
            return (index < offers.len()).then_some(index);
        }

        let number = self.offer_number.as_ref()?.captures(&text)?;
        let index = number[1].parse::<usize>().ok()?.checked_sub(1)?;
        (index < offers.len()).then_some(index)
    }

    fn day_and_hour(&self, text: &str, offers: &[SlotOffer]) -> Option<usize> {
        let captures = self.hour.as_ref()?.captures(text)?;
        let hour: u32 = captures[1].parse().ok()?;
        let minute: Option<u32> = captures.get(2).and_then(|m| m.as_str().parse().ok());

        offers.iter().position(|offer| {
            has_phrase(text, offer.weekday_name())
                && offer.time.hour() == hour
                && minute.map_or(true, |m| offer.time.minute() == m)
        })
    }
}

/// Lowercased, accents folded, punctuation turned into spaces, padded with one
/// space on each side so phrases can be matched on word boundaries.
pub fn normalize(text: &str) -> String {
    let folded: String = text
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'à' | 'â' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'î' | 'ï' => 'i',
            'ô' | 'ö' => 'o',
            'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            c if c.is_alphanumeric() => c,
            _ => ' ',
        })
        .collect();
    format!(" {} ", folded.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn has_phrase(normalized: &str, phrase: &str) -> bool {
    !phrase.is_empty() && normalized.contains(&format!(" {} ", phrase))
}
