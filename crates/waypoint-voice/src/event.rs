//! Guidance events from the navigation SDK and their spoken phrasing.

use crate::config::Units;
use crate::locale::Locale;
use crate::message::SpokenMessage;
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// The manoeuvre a guidance event announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GuidanceKind {
    Depart,
    Continue,
    TurnLeft,
    TurnRight,
    SlightLeft,
    SlightRight,
    UTurn,
    Roundabout { exit: u8 },
    Arrive,
    Reroute,
}

/// A discrete notification that an announcement may be warranted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidanceEvent {
    pub id: String,
    pub kind: GuidanceKind,
    /// Distance to the manoeuvre; `None` means "now".
    #[serde(default)]
    pub distance_meters: Option<u32>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default = "default_true")]
    pub interruptible: bool,
}

impl GuidanceEvent {
    pub fn new(id: impl Into<String>, kind: GuidanceKind) -> Self {
        Self {
            id: id.into(),
            kind,
            distance_meters: None,
            street: None,
            interruptible: true,
        }
    }

    pub fn in_meters(mut self, meters: u32) -> Self {
        self.distance_meters = Some(meters);
        self
    }

    pub fn onto(mut self, street: impl Into<String>) -> Self {
        self.street = Some(street.into());
        self
    }

    pub fn non_interruptible(mut self) -> Self {
        self.interruptible = false;
        self
    }

    /// Human-readable announcement for `locale`.
    ///
    /// Languages without a phrasebook fall back to English.
    pub fn speech_text(&self, locale: &Locale, units: Units) -> String {
        let book = Phrasebook::for_language(locale.language());
        let action = book.action(self.kind);
        let street = self
            .street
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let mut text = match self.distance_meters {
            Some(meters) if meters > 0 && !matches!(self.kind, GuidanceKind::Reroute) => {
                let distance = spoken_distance(meters, units, &book);
                format!("{} {}, {}", book.within, distance, action)
            }
            _ => capitalize(action),
        };
        if let Some(street) = street {
            let preposition = match self.kind {
                GuidanceKind::Arrive | GuidanceKind::Depart => book.at,
                _ => book.onto,
            };
            text.push(' ');
            text.push_str(preposition);
            text.push(' ');
            text.push_str(street);
        }
        text
    }

    pub fn to_spoken_message(&self, locale: &Locale, units: Units) -> SpokenMessage {
        SpokenMessage {
            text: self.speech_text(locale, units),
            id: self.id.clone(),
            interruptible: self.interruptible,
        }
    }
}

struct Phrasebook {
    within: &'static str,
    onto: &'static str,
    at: &'static str,
    meters: &'static str,
    kilometers: &'static str,
    feet: &'static str,
    miles: &'static str,
    depart: &'static str,
    continue_straight: &'static str,
    turn_left: &'static str,
    turn_right: &'static str,
    slight_left: &'static str,
    slight_right: &'static str,
    u_turn: &'static str,
    roundabout: &'static str,
    arrive: &'static str,
    reroute: &'static str,
}

const ENGLISH: Phrasebook = Phrasebook {
    within: "In",
    onto: "onto",
    at: "at",
    meters: "meters",
    kilometers: "kilometers",
    feet: "feet",
    miles: "miles",
    depart: "head off",
    continue_straight: "continue straight",
    turn_left: "turn left",
    turn_right: "turn right",
    slight_left: "bear left",
    slight_right: "bear right",
    u_turn: "make a U-turn",
    roundabout: "at the roundabout, take exit {}",
    arrive: "you have arrived",
    reroute: "new route found",
};

const GERMAN: Phrasebook = Phrasebook {
    within: "In",
    onto: "auf",
    at: "an",
    meters: "Metern",
    kilometers: "Kilometern",
    feet: "Fuß",
    miles: "Meilen",
    depart: "losfahren",
    continue_straight: "geradeaus weiterfahren",
    turn_left: "links abbiegen",
    turn_right: "rechts abbiegen",
    slight_left: "leicht links halten",
    slight_right: "leicht rechts halten",
    u_turn: "wenden",
    roundabout: "im Kreisverkehr die Ausfahrt {} nehmen",
    arrive: "Sie haben Ihr Ziel erreicht",
    reroute: "neue Route berechnet",
};

const FRENCH: Phrasebook = Phrasebook {
    within: "Dans",
    onto: "sur",
    at: "à",
    meters: "mètres",
    kilometers: "kilomètres",
    feet: "pieds",
    miles: "miles",
    depart: "partez",
    continue_straight: "continuez tout droit",
    turn_left: "tournez à gauche",
    turn_right: "tournez à droite",
    slight_left: "serrez à gauche",
    slight_right: "serrez à droite",
    u_turn: "faites demi-tour",
    roundabout: "au rond-point, prenez la sortie {}",
    arrive: "vous êtes arrivé",
    reroute: "nouvel itinéraire trouvé",
};

const SPANISH: Phrasebook = Phrasebook {
    within: "En",
    onto: "hacia",
    at: "en",
    meters: "metros",
    kilometers: "kilómetros",
    feet: "pies",
    miles: "millas",
    depart: "salga",
    continue_straight: "siga recto",
    turn_left: "gire a la izquierda",
    turn_right: "gire a la derecha",
    slight_left: "manténgase a la izquierda",
    slight_right: "manténgase a la derecha",
    u_turn: "dé la vuelta",
    roundabout: "en la rotonda, tome la salida {}",
    arrive: "ha llegado a su destino",
    reroute: "nueva ruta encontrada",
};

impl Phrasebook {
    fn for_language(language: &str) -> &'static Phrasebook {
        match language {
            "de" => &GERMAN,
            "fr" => &FRENCH,
            "es" => &SPANISH,
            _ => &ENGLISH,
        }
    }

    fn action(&self, kind: GuidanceKind) -> String {
        match kind {
            GuidanceKind::Depart => self.depart.to_string(),
            GuidanceKind::Continue => self.continue_straight.to_string(),
            GuidanceKind::TurnLeft => self.turn_left.to_string(),
            GuidanceKind::TurnRight => self.turn_right.to_string(),
            GuidanceKind::SlightLeft => self.slight_left.to_string(),
            GuidanceKind::SlightRight => self.slight_right.to_string(),
            GuidanceKind::UTurn => self.u_turn.to_string(),
            GuidanceKind::Roundabout { exit } => self.roundabout.replace("{}", &exit.to_string()),
            GuidanceKind::Arrive => self.arrive.to_string(),
            GuidanceKind::Reroute => self.reroute.to_string(),
        }
    }
}

/// Round a distance the way it is said aloud ("200 meters", "1.5 kilometers").
fn spoken_distance(meters: u32, units: Units, book: &Phrasebook) -> String {
    match units {
        Units::Metric => {
            if meters >= 1000 {
                format!("{} {}", one_decimal(meters as f64 / 1000.0), book.kilometers)
            } else {
                format!("{} {}", round_to(meters as f64, step_for(meters as f64)), book.meters)
            }
        }
        Units::Imperial => {
            let feet = meters as f64 * 3.28084;
            // Switch to miles at a tenth of a mile.
            if feet >= 528.0 {
                format!("{} {}", one_decimal(meters as f64 / 1609.344), book.miles)
            } else {
                format!("{} {}", round_to(feet, step_for(feet)), book.feet)
            }
        }
    }
}

fn step_for(value: f64) -> f64 {
    if value < 100.0 {
        10.0
    } else if value < 500.0 {
        50.0
    } else {
        100.0
    }
}

fn round_to(value: f64, step: f64) -> u32 {
    (((value / step).round() * step).max(step)) as u32
}

fn one_decimal(value: f64) -> String {
    let rounded = (value * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{}", rounded as u64)
    } else {
        format!("{:.1}", rounded)
    }
}

fn capitalize(s: String) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => s,
    }
}
