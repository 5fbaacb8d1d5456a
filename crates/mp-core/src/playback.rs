//! Playback loop
//!
//! Walks the session queue one song at a time, honoring the skip list,
//! shuffle and repeat, and stops promptly when interrupted.

use std::io::Write;
use std::path::{ Path, PathBuf };
use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, Ordering };

use crate::metadata::{ self, MetadataReader };
use crate::player::PlayerError;
use crate::session::{ SessionPhase, SessionState };


/// Shared flag raised when the user asks the player to stop.
#[derive( Debug, Clone, Default )]
pub struct Interrupt( Arc<AtomicBool> );


impl Interrupt {
    /// Creates a flag that is not raised.
    pub fn new() -> Self {
        Self::default()
    }


    /// Raises the flag. Safe to call from any thread.
    pub fn trigger( &self ) {
        self.0.store( true, Ordering::SeqCst );
    }


    /// Returns true once the flag has been raised.
    pub fn is_triggered( &self ) -> bool {
        self.0.load( Ordering::SeqCst )
    }
}


/// How a single song ended.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum PlayOutcome {
    /// Played to the end of the stream.
    Finished,
    /// Stopped early because the interrupt was raised.
    Interrupted,
}


/// Something that can play one song to completion.
pub trait PlaybackDriver {
    /// Plays `path`, blocking until it ends or `interrupt` is raised.
    fn play( &mut self, path: &Path, interrupt: &Interrupt ) -> Result<PlayOutcome, PlayerError>;
}


/// How a whole run ended.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum RunOutcome {
    Finished,
    Interrupted,
}


/// Options for [`play_session`].
#[derive( Debug, Clone, Default )]
pub struct PlaybackOptions {
    /// Start over after the last song.
    pub repeat: bool,

    /// Shuffle the queue before every pass.
    pub shuffle: bool,

    /// Do not print the summary of each song.
    pub quiet: bool,

    /// File to receive "artist - title" for the current song.
    pub now_playing_path: Option<PathBuf>,
}


/// Collaborators used by [`play_session`].
pub struct Playback<'a, D: PlaybackDriver> {
    pub driver: &'a mut D,
    pub metadata: &'a MetadataReader,
    pub interrupt: &'a Interrupt,
    pub options: &'a PlaybackOptions,
}


/// Plays the session queue until it is exhausted or interrupted.
///
/// Song summaries go to `out`. Songs in the skip list are passed over; the
/// skip and played lists are cleared at the end of every full pass. On
/// return the session's `already_played()` is what should be persisted.
pub fn play_session<D, W>( session: &mut SessionState, playback: Playback<'_, D>, out: &mut W ) -> RunOutcome
where
    D: PlaybackDriver,
    W: Write,
{
    let Playback { driver, metadata, interrupt, options } = playback;

    loop {
        if options.shuffle {
            session.shuffle();
        }
        session.set_phase( SessionPhase::Playing );

        let queue = session.queue().to_vec();
        let mut attempted = 0usize;
        let mut failed = 0usize;

        for song in &queue {
            if interrupt.is_triggered() {
                session.set_phase( SessionPhase::Interrupted );
                return RunOutcome::Interrupted;
            }

            if session.should_skip( song ) {
                tracing::debug!( "Skipping already played: {:?}", song );
                continue;
            }

            session.before_play( song );
            announce( song, metadata, options, out );
            attempted += 1;

            match driver.play( song, interrupt ) {
                Ok( PlayOutcome::Finished ) => session.after_play( song ),
                Ok( PlayOutcome::Interrupted ) => {
                    tracing::info!( "Interrupted while playing {:?}", song );
                    session.set_phase( SessionPhase::Interrupted );
                    return RunOutcome::Interrupted;
                }
                Err( e ) => {
                    // A broken song counts as having ended
                    tracing::error!( "{}: {}", song.display(), e );
                    failed += 1;
                    session.after_play( song );
                }
            }
        }

        session.set_phase( SessionPhase::CycleComplete );
        session.reset_for_next_cycle();

        if !options.repeat {
            break;
        }
        if attempted > 0 && failed == attempted {
            tracing::warn!( "Every song failed to play, not repeating" );
            break;
        }
        session.set_phase( SessionPhase::Ready );
    }

    session.set_phase( SessionPhase::Finished );
    RunOutcome::Finished
}


/// Publishes and prints the song about to play.
fn announce<W: Write>( song: &Path, metadata: &MetadataReader, options: &PlaybackOptions, out: &mut W ) {
    let meta = metadata.read( song );

    if let Some( target ) = &options.now_playing_path {
        if let Err( e ) = metadata::write_now_playing( target, meta.as_ref() ) {
            tracing::warn!( "{}", e );
        }
    }

    if !options.quiet {
        if let Err( e ) = writeln!( out, "{}", metadata.summary_of( song, meta.as_ref() ) ) {
            tracing::debug!( "Failed to display song: {}", e );
        }
    }
}
