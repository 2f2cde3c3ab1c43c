//! Dice rolling system
//!
//! Parses dice notation like "2d6+3", "1d20", "4d6-2" and defines the
//! [`DiceRoller`] collaborator every roll in the engine goes through, so
//! initiative, attack and damage rolls can be replayed with fixed faces.

use std::collections::VecDeque;
use std::str::FromStr;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on dice in a written expression
pub const MAX_DICE: u32 = 100;

/// Upper bound on dice in one roll; a critical hit doubles a full expression
pub const MAX_ROLLED_DICE: u32 = MAX_DICE * 2;

/// Dice notation and roller errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceError {
    #[error("invalid dice notation '{0}': {1}")]
    Notation(String, String),

    #[error("dice count must be between 1 and {max}, got {count}")]
    Count { count: u32, max: u32 },

    #[error("die sides must be at least 1")]
    Sides,

    #[error("scripted roller ran out of faces")]
    Exhausted,

    #[error("scripted face {face} does not fit a d{sides}")]
    Face { face: u32, sides: u32 },
}

/// A parsed dice expression
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DiceExpr {
    /// Number of dice to roll
    pub count: u32,
    /// Number of sides per die
    pub sides: u32,
    /// Modifier to add/subtract
    pub modifier: i32,
}

impl DiceExpr {
    /// Create a new dice expression
    pub fn new(count: u32, sides: u32, modifier: i32) -> Self {
        Self {
            count,
            sides,
            modifier,
        }
    }

    /// Get the minimum possible result
    pub fn min(&self) -> i32 {
        self.count as i32 + self.modifier
    }

    /// Get the maximum possible result
    pub fn max(&self) -> i32 {
        (self.count * self.sides) as i32 + self.modifier
    }

    /// Get the expected average (rounded down)
    pub fn average(&self) -> i32 {
        let avg_per_die = (1.0 + self.sides as f64) / 2.0;
        (self.count as f64 * avg_per_die + self.modifier as f64) as i32
    }

    /// Same expression with twice the dice; the modifier is not doubled
    pub fn doubled_dice(&self) -> Self {
        Self {
            count: self.count * 2,
            ..self.clone()
        }
    }
}

impl FromStr for DiceExpr {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_dice(s)
    }
}

impl TryFrom<String> for DiceExpr {
    type Error = DiceError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        parse_dice(&s)
    }
}

impl From<DiceExpr> for String {
    fn from(expr: DiceExpr) -> Self {
        expr.to_string()
    }
}

impl std::fmt::Display for DiceExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.modifier > 0 {
            write!(f, "{}d{}+{}", self.count, self.sides, self.modifier)
        } else if self.modifier < 0 {
            write!(f, "{}d{}{}", self.count, self.sides, self.modifier)
        } else {
            write!(f, "{}d{}", self.count, self.sides)
        }
    }
}

/// Parse a dice notation string like "2d6+3"
pub fn parse_dice(notation: &str) -> Result<DiceExpr, DiceError> {
    let original = notation;
    let notation = notation.trim().to_lowercase();
    let invalid = |reason: &str| DiceError::Notation(original.to_string(), reason.to_string());

    let d_pos = notation.find('d').ok_or_else(|| invalid("missing 'd'"))?;

    // "d6" means "1d6"
    let count_str = &notation[..d_pos];
    let count: u32 = if count_str.is_empty() {
        1
    } else {
        count_str.parse().map_err(|_| invalid("bad dice count"))?
    };

    let rest = &notation[d_pos + 1..];
    let (sides_str, modifier) = if let Some(plus_pos) = rest.find('+') {
        let modifier: i32 = rest[plus_pos + 1..]
            .parse()
            .map_err(|_| invalid("bad modifier"))?;
        (&rest[..plus_pos], modifier)
    } else if let Some(minus_pos) = rest.rfind('-').filter(|&p| p > 0) {
        // includes the minus sign
        let modifier: i32 = rest[minus_pos..]
            .parse()
            .map_err(|_| invalid("bad modifier"))?;
        (&rest[..minus_pos], modifier)
    } else {
        (rest, 0)
    };

    let sides: u32 = sides_str.parse().map_err(|_| invalid("bad die sides"))?;

    validate(count, sides, MAX_DICE)?;
    Ok(DiceExpr {
        count,
        sides,
        modifier,
    })
}

fn validate(count: u32, sides: u32, max: u32) -> Result<(), DiceError> {
    if count == 0 || count > max {
        return Err(DiceError::Count { count, max });
    }
    if sides == 0 {
        return Err(DiceError::Sides);
    }
    Ok(())
}

/// Outcome of one roll: individual faces, the flat bonus, and the total
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollResult {
    pub total: i32,
    pub rolls: Vec<u32>,
    pub bonus: i32,
}

impl RollResult {
    fn from_faces(rolls: Vec<u32>, bonus: i32) -> Self {
        let sum: u32 = rolls.iter().sum();
        Self {
            total: sum as i32 + bonus,
            rolls,
            bonus,
        }
    }

    /// Face of the first die (the natural roll of a d20 check)
    pub fn natural(&self) -> u32 {
        self.rolls.first().copied().unwrap_or(0)
    }
}

/// Source of every die the engine rolls
pub trait DiceRoller: Send + Sync {
    /// Roll `count` dice with `sides` faces and add `bonus`
    fn roll(&self, count: u32, sides: u32, bonus: i32) -> Result<RollResult, DiceError>;

    /// Roll a parsed expression
    fn roll_expr(&self, expr: &DiceExpr) -> Result<RollResult, DiceError> {
        self.roll(expr.count, expr.sides, expr.modifier)
    }

    /// Roll a single d20 and return the face
    fn d20(&self) -> Result<u32, DiceError> {
        Ok(self.roll(1, 20, 0)?.natural())
    }
}

/// Roller backed by a pseudo-random generator
#[derive(Debug)]
pub struct RandomRoller {
    rng: Mutex<StdRng>,
}

impl RandomRoller {
    /// Create a roller seeded from the operating system
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Create a reproducible roller
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomRoller {
    fn default() -> Self {
        Self::new()
    }
}

impl DiceRoller for RandomRoller {
    fn roll(&self, count: u32, sides: u32, bonus: i32) -> Result<RollResult, DiceError> {
        validate(count, sides, MAX_ROLLED_DICE)?;
        let mut rng = self.rng.lock();
        let rolls = (0..count).map(|_| rng.random_range(1..=sides)).collect();
        Ok(RollResult::from_faces(rolls, bonus))
    }
}

/// Roller that replays a fixed sequence of faces
///
/// Each die consumes the next face. Running out of faces, or a face larger
/// than the die, is an error rather than a made-up roll.
#[derive(Debug, Default)]
pub struct ScriptedRoller {
    faces: Mutex<VecDeque<u32>>,
}

impl ScriptedRoller {
    pub fn new(faces: impl IntoIterator<Item = u32>) -> Self {
        Self {
            faces: Mutex::new(faces.into_iter().collect()),
        }
    }

    /// Queue more faces behind the remaining ones
    pub fn push(&self, faces: impl IntoIterator<Item = u32>) {
        self.faces.lock().extend(faces);
    }

    /// Faces not yet consumed
    pub fn remaining(&self) -> usize {
        self.faces.lock().len()
    }
}

impl DiceRoller for ScriptedRoller {
    fn roll(&self, count: u32, sides: u32, bonus: i32) -> Result<RollResult, DiceError> {
        validate(count, sides, MAX_ROLLED_DICE)?;
        let mut faces = self.faces.lock();
        if faces.len() < count as usize {
            return Err(DiceError::Exhausted);
        }
        let rolls: Vec<u32> = faces.drain(..count as usize).collect();
        if let Some(&face) = rolls.iter().find(|&&f| f == 0 || f > sides) {
            return Err(DiceError::Face { face, sides });
        }
        Ok(RollResult::from_faces(rolls, bonus))
    }
}

/// Check if a d20 roll is a natural 20 (critical hit)
pub fn is_critical(roll: u32) -> bool {
    roll == 20
}

/// Check if a d20 roll is a natural 1 (critical fail)
pub fn is_fumble(roll: u32) -> bool {
    roll == 1
}
