use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle status of an auction session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuctionStatus {
    Idle,
    Configured,
    Running,
    Paused,
    Finished,
    Archived,
}

impl AuctionStatus {
    pub const ALL: [AuctionStatus; 6] = [
        AuctionStatus::Idle,
        AuctionStatus::Configured,
        AuctionStatus::Running,
        AuctionStatus::Paused,
        AuctionStatus::Finished,
        AuctionStatus::Archived,
    ];

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionStatus::Idle => "idle",
            AuctionStatus::Configured => "configured",
            AuctionStatus::Running => "running",
            AuctionStatus::Paused => "paused",
            AuctionStatus::Finished => "finished",
            AuctionStatus::Archived => "archived",
        }
    }

    /// Human readable label for operator controls
    pub fn label(&self) -> &'static str {
        match self {
            AuctionStatus::Idle => "Ready to configure",
            AuctionStatus::Configured => "Configured",
            AuctionStatus::Running => "Running",
            AuctionStatus::Paused => "Paused",
            AuctionStatus::Finished => "Finished",
            AuctionStatus::Archived => "Archived",
        }
    }

    /// Configured, running or paused
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            AuctionStatus::Configured | AuctionStatus::Running | AuctionStatus::Paused
        )
    }
}

impl FromStr for AuctionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(AuctionStatus::Idle),
            "configured" => Ok(AuctionStatus::Configured),
            "running" => Ok(AuctionStatus::Running),
            "paused" => Ok(AuctionStatus::Paused),
            "finished" => Ok(AuctionStatus::Finished),
            "archived" => Ok(AuctionStatus::Archived),
            _ => Err(format!("Invalid status: {}", s)),
        }
    }
}

impl fmt::Display for AuctionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator events driving the status FSM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuctionEvent {
    Configure,
    Start,
    Pause,
    Resume,
    Finish,
    Archive,
    Reset,
}

impl AuctionEvent {
    pub const ALL: [AuctionEvent; 7] = [
        AuctionEvent::Configure,
        AuctionEvent::Start,
        AuctionEvent::Pause,
        AuctionEvent::Resume,
        AuctionEvent::Finish,
        AuctionEvent::Archive,
        AuctionEvent::Reset,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionEvent::Configure => "configure",
            AuctionEvent::Start => "start",
            AuctionEvent::Pause => "pause",
            AuctionEvent::Resume => "resume",
            AuctionEvent::Finish => "finish",
            AuctionEvent::Archive => "archive",
            AuctionEvent::Reset => "reset",
        }
    }
}

impl FromStr for AuctionEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "configure" => Ok(AuctionEvent::Configure),
            "start" => Ok(AuctionEvent::Start),
            "pause" => Ok(AuctionEvent::Pause),
            "resume" => Ok(AuctionEvent::Resume),
            "finish" => Ok(AuctionEvent::Finish),
            "archive" => Ok(AuctionEvent::Archive),
            "reset" => Ok(AuctionEvent::Reset),
            _ => Err(format!("Invalid event: {}", s)),
        }
    }
}

impl fmt::Display for AuctionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Presentation used to reveal lots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuctionMode {
    Cards,
    Roulette,
}

impl AuctionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionMode::Cards => "cards",
            AuctionMode::Roulette => "roulette",
        }
    }
}

impl FromStr for AuctionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cards" => Ok(AuctionMode::Cards),
            "roulette" => Ok(AuctionMode::Roulette),
            _ => Err(format!("Invalid mode: {}", s)),
        }
    }
}

/// Whether one draw decides the winner or lots are eliminated round by round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubMode {
    Instant,
    Elimination,
}

impl SubMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubMode::Instant => "instant",
            SubMode::Elimination => "elimination",
        }
    }
}

impl FromStr for SubMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "instant" => Ok(SubMode::Instant),
            "elimination" => Ok(SubMode::Elimination),
            _ => Err(format!("Invalid sub mode: {}", s)),
        }
    }
}

/// Operator-chosen parameters of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionSettings {
    pub mode: AuctionMode,
    pub sub_mode: SubMode,
    pub duration_sec: u32,
    pub spin_sec: u32,
}

/// One run of the auction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Auction {
    pub id: Uuid,
    pub status: AuctionStatus,
    pub mode: AuctionMode,
    pub sub_mode: SubMode,
    pub duration_sec: u32,
    pub spin_sec: u32,
    pub winner_lot_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Auction {
    /// Create a new idle Auction. Settings are validated by the session layer.
    pub fn new(settings: AuctionSettings, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: AuctionStatus::Idle,
            mode: settings.mode,
            sub_mode: settings.sub_mode,
            duration_sec: settings.duration_sec,
            spin_sec: settings.spin_sec,
            winner_lot_id: None,
            started_at: None,
            finished_at: None,
            created_at: now,
        }
    }

    pub fn settings(&self) -> AuctionSettings {
        AuctionSettings {
            mode: self.mode,
            sub_mode: self.sub_mode,
            duration_sec: self.duration_sec,
            spin_sec: self.spin_sec,
        }
    }

    /// Check if auction is configured, running or paused
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Only idle or archived auctions may be deleted
    pub fn is_deletable(&self) -> bool {
        matches!(self.status, AuctionStatus::Idle | AuctionStatus::Archived)
    }
}
