//! Session state
//!
//! Holds the queue for the current run together with the songs to skip
//! (played by an earlier, interrupted run) and the songs played so far.

use std::collections::HashSet;
use std::path::{ Path, PathBuf };

use rand::seq::SliceRandom;


/// Where the session is in its lifecycle.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum SessionPhase {
    #[default]
    Idle,
    Expanding,
    Ready,
    Playing,
    CycleComplete,
    Interrupted,
    Finished,
    Persisting,
}


/// When a song is recorded as played, relative to its playback.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum RecordPolicy {
    /// Recorded as it starts: a song cut off by a kill is not replayed.
    BeforePlay,
    /// Recorded once it ends: a song cut off by a kill is replayed.
    AfterPlay,
}


impl RecordPolicy {
    /// Maps the `skip_song_that_was_playing_when_last_killed` setting.
    pub fn from_skip_interrupted( skip_interrupted: bool ) -> Self {
        if skip_interrupted {
            RecordPolicy::BeforePlay
        } else {
            RecordPolicy::AfterPlay
        }
    }
}


/// Queue, skip list and played list of one run.
#[derive( Debug, Clone )]
pub struct SessionState {
    queue: Vec<PathBuf>,
    skip: Vec<PathBuf>,
    played: Vec<PathBuf>,
    policy: RecordPolicy,
    phase: SessionPhase,
}


impl SessionState {
    /// Creates an empty session recording songs with `policy`.
    pub fn new( policy: RecordPolicy ) -> Self {
        Self {
            queue: Vec::new(),
            skip: Vec::new(),
            played: Vec::new(),
            policy,
            phase: SessionPhase::Idle,
        }
    }


    /// Replaces the queue.
    pub fn set_queue( &mut self, songs: Vec<PathBuf> ) {
        self.queue = songs;
        self.phase = SessionPhase::Ready;
    }


    /// Replaces the list of songs to skip this run.
    pub fn set_skip( &mut self, paths: Vec<PathBuf> ) {
        self.skip = paths;
    }


    /// Gets the queue in play order.
    pub fn queue( &self ) -> &[PathBuf] {
        &self.queue
    }


    /// Gets the songs being skipped this run.
    pub fn skip( &self ) -> &[PathBuf] {
        &self.skip
    }


    /// Gets the songs recorded as played this run.
    pub fn played( &self ) -> &[PathBuf] {
        &self.played
    }


    /// Gets the current phase.
    pub fn phase( &self ) -> SessionPhase {
        self.phase
    }


    /// Moves the session to `phase`.
    pub fn set_phase( &mut self, phase: SessionPhase ) {
        tracing::debug!( "Session phase: {:?} -> {:?}", self.phase, phase );
        self.phase = phase;
    }


    /// Shuffles the queue with a uniform random permutation.
    pub fn shuffle( &mut self ) {
        let mut rng = rand::thread_rng();
        self.queue.shuffle( &mut rng );
    }


    /// Returns true if the song was played by the run being resumed.
    pub fn should_skip( &self, song: &Path ) -> bool {
        self.skip.iter().any( |s| s == song )
    }


    /// Appends a song to the played list.
    pub fn record_played( &mut self, song: &Path ) {
        self.played.push( song.to_path_buf() );
    }


    /// Called just before a song starts; records it under `BeforePlay`.
    pub fn before_play( &mut self, song: &Path ) {
        if self.policy == RecordPolicy::BeforePlay {
            self.record_played( song );
        }
    }


    /// Called once a song has played to the end; records it under `AfterPlay`.
    pub fn after_play( &mut self, song: &Path ) {
        if self.policy == RecordPolicy::AfterPlay {
            self.record_played( song );
        }
    }


    /// Songs that must not be replayed on resume: the skip list followed by
    /// the played list, keeping only the first occurrence of each.
    pub fn already_played( &self ) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        self.skip
            .iter()
            .chain( self.played.iter() )
            .filter( |song| seen.insert( song.as_path() ) )
            .cloned()
            .collect()
    }


    /// Forgets skipped and played songs after a full pass through the queue.
    pub fn reset_for_next_cycle( &mut self ) {
        self.skip.clear();
        self.played.clear();
    }
}


impl Default for SessionState {
    fn default() -> Self {
        Self::new( RecordPolicy::BeforePlay )
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    fn paths( names: &[&str] ) -> Vec<PathBuf> {
        names.iter().map( PathBuf::from ).collect()
    }


    #[test]
    fn test_already_played_dedups_skip_then_played() {
        let mut session = SessionState::default();
        session.set_skip( paths( &[ "a.mp3", "b.mp3" ] ) );
        session.record_played( Path::new( "c.mp3" ) );
        session.record_played( Path::new( "a.mp3" ) );
        session.record_played( Path::new( "c.mp3" ) );

        assert_eq!( session.already_played(), paths( &[ "a.mp3", "b.mp3", "c.mp3" ] ) );
    }


    #[test]
    fn test_before_play_policy() {
        let mut session = SessionState::new( RecordPolicy::BeforePlay );
        session.before_play( Path::new( "a.mp3" ) );
        assert_eq!( session.played(), paths( &[ "a.mp3" ] ).as_slice() );

        session.after_play( Path::new( "a.mp3" ) );
        assert_eq!( session.played().len(), 1 );
    }


    #[test]
    fn test_after_play_policy() {
        let mut session = SessionState::new( RecordPolicy::AfterPlay );
        session.before_play( Path::new( "a.mp3" ) );
        assert!( session.played().is_empty() );

        session.after_play( Path::new( "a.mp3" ) );
        assert_eq!( session.played(), paths( &[ "a.mp3" ] ).as_slice() );
    }


    #[test]
    fn test_policy_from_setting() {
        assert_eq!( RecordPolicy::from_skip_interrupted( true ), RecordPolicy::BeforePlay );
        assert_eq!( RecordPolicy::from_skip_interrupted( false ), RecordPolicy::AfterPlay );
    }


    #[test]
    fn test_should_skip_exact_match() {
        let mut session = SessionState::default();
        session.set_skip( paths( &[ "music/x.mp3" ] ) );

        assert!( session.should_skip( Path::new( "music/x.mp3" ) ) );
        assert!( !session.should_skip( Path::new( "music/y.mp3" ) ) );
        assert!( !session.should_skip( Path::new( "x.mp3" ) ) );
    }


    #[test]
    fn test_reset_for_next_cycle_keeps_queue() {
        let mut session = SessionState::default();
        session.set_queue( paths( &[ "a.mp3", "b.mp3" ] ) );
        session.set_skip( paths( &[ "a.mp3" ] ) );
        session.record_played( Path::new( "b.mp3" ) );

        session.reset_for_next_cycle();

        assert!( session.already_played().is_empty() );
        assert_eq!( session.queue().len(), 2 );
    }


    #[test]
    fn test_shuffle_preserves_songs() {
        let mut session = SessionState::default();
        let songs: Vec<PathBuf> = ( 0..20 ).map( |i| PathBuf::from( format!( "{i}.mp3" ) ) ).collect();
        session.set_queue( songs.clone() );

        session.shuffle();

        let mut shuffled = session.queue().to_vec();
        shuffled.sort();
        let mut expected = songs;
        expected.sort();
        assert_eq!( shuffled, expected );
    }


    #[test]
    fn test_shuffle_changes_order() {
        let mut session = SessionState::default();
        let songs: Vec<PathBuf> = ( 0..20 ).map( |i| PathBuf::from( format!( "{i}.mp3" ) ) ).collect();
        session.set_queue( songs.clone() );

        // 1 in 20! chance of staying put on any one try
        let changed = ( 0..3 ).any( |_| {
            session.shuffle();
            session.queue() != songs.as_slice()
        });
        assert!( changed );
    }


    #[test]
    fn test_set_queue_makes_session_ready() {
        let mut session = SessionState::default();
        assert_eq!( session.phase(), SessionPhase::Idle );
        session.set_queue( paths( &[ "a.mp3" ] ) );
        assert_eq!( session.phase(), SessionPhase::Ready );
    }
}
