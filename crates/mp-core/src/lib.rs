//! mp core - queue, session and restart engine
//!
//! This crate expands command-line inputs into a play queue, tracks what
//! has been played across shuffle and repeat passes, persists that state
//! to a restart file, and plays songs through a Symphonia/cpal driver.

pub mod config;
pub mod decoder;
pub mod expand;
pub mod metadata;
pub mod output;
pub mod playback;
pub mod player;
pub mod playlist;
pub mod restart;
pub mod session;

pub use config::PlayerConfig;
pub use expand::{ ExpandError, Expansion, PathExpander, Skipped };
pub use metadata::{ MetadataReader, SongMetadata, TagExtractor };
pub use playback::{ play_session, Interrupt, PlayOutcome, Playback, PlaybackDriver, PlaybackOptions, RunOutcome };
pub use player::{ AudioPlayer, PlayerError };
pub use playlist::PlaylistError;
pub use restart::{ RestartError, RestartRecord, RestartStore };
pub use session::{ RecordPolicy, SessionPhase, SessionState };
