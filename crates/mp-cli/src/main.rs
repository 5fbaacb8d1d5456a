//! mp - command-line music player with resumable sessions

mod cli;
mod settings;
mod signal;

use std::io::{ self, Write };
use std::path::PathBuf;

use anyhow::{ Context, Result };
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Args;
use mp_core::{
    play_session, playlist, AudioPlayer, ExpandError, Interrupt, MetadataReader, PathExpander, Playback,
    PlaybackDriver, PlaybackOptions, PlayerConfig, RecordPolicy, RestartStore, RunOutcome, SessionPhase,
    SessionState, Skipped,
};


/// Environment variable holding the log filter, e.g. `MP_LOG=debug`.
const LOG_ENV: &str = "MP_LOG";


/// Sets up logging to stderr, filtered by `MP_LOG` (default `warn`).
fn init_logging() {
    let filter = EnvFilter::try_from_env( LOG_ENV ).unwrap_or_else( |_| EnvFilter::new( "warn" ) );

    tracing_subscriber::fmt()
        .with_env_filter( filter )
        .with_writer( io::stderr )
        .with_target( false )
        .init();
}


/// What this run plays: the parsed arguments, the raw argument list they
/// came from (saved for the next resume), and the songs to skip.
struct Invocation {
    argv: Vec<String>,
    args: Args,
    skip: Vec<PathBuf>,
}


impl Invocation {
    /// Uses the arguments given on the command line.
    fn fresh( argv: Vec<String> ) -> Self {
        let args = Args::parse_from( std::iter::once( "mp".to_string() ).chain( argv.iter().cloned() ) );
        Self { argv, args, skip: Vec::new() }
    }


    /// Resumes the session saved in the restart file.
    fn restore( store: &RestartStore ) -> Result<Self> {
        let record = store.load().context( "previous session information not found" )?;
        let args = Args::from_restored( &record.args )
            .with_context( || format!( "{}: cannot parse saved arguments", store.path().display() ) )?;

        tracing::info!(
            "Resuming {:?} with {} songs already played",
            record.args,
            record.skip.len()
        );
        Ok( Self { argv: record.args, args, skip: record.skip } )
    }
}


/// Expands the arguments into songs, reporting skipped inputs to `err`.
fn expand<E: Write>( config: &PlayerConfig, args: &Args, err: &mut E ) -> Result<Vec<PathBuf>, ExpandError> {
    let result = PathExpander::new( config ).expand( &args.songs, None );

    let skipped = match &result {
        Ok( expansion ) => &expansion.skipped,
        Err( ExpandError::EmptyQueue { skipped } ) => skipped,
    };
    if !args.quiet {
        report_skipped( skipped, err );
    }

    result.map( |expansion| expansion.songs )
}


fn report_skipped<E: Write>( skipped: &[Skipped], err: &mut E ) {
    for s in skipped {
        if let Err( e ) = writeln!( err, "mp: {}", s ) {
            tracing::debug!( "Failed to report skipped input: {}", e );
        }
    }
}


fn new_session( config: &PlayerConfig ) -> SessionState {
    SessionState::new( RecordPolicy::from_skip_interrupted(
        config.skip_song_that_was_playing_when_last_killed,
    ))
}


/// Plays the queued session and saves it to the restart file.
///
/// The restart file is written however the run ends, so the next
/// invocation without arguments picks up where this one stopped.
fn run_session<D, W>(
    config: &PlayerConfig,
    store: &RestartStore,
    invocation: Invocation,
    mut session: SessionState,
    driver: &mut D,
    interrupt: &Interrupt,
    out: &mut W,
) -> Result<RunOutcome>
where
    D: PlaybackDriver,
    W: Write,
{
    let Invocation { argv, args, skip } = invocation;
    session.set_skip( skip );

    let metadata = MetadataReader::new( config );
    let options = PlaybackOptions {
        repeat: args.repeat,
        shuffle: args.shuffle,
        quiet: args.quiet,
        now_playing_path: config.now_playing_path.clone(),
    };
    let playback = Playback {
        driver,
        metadata: &metadata,
        interrupt,
        options: &options,
    };

    let outcome = play_session( &mut session, playback, out );

    session.set_phase( SessionPhase::Persisting );
    store
        .save( &argv, &session.already_played() )
        .context( "cannot save session" )?;
    tracing::debug!( "Saved session to {:?}", store.path() );

    Ok( outcome )
}


/// Runs one invocation: resume or expand, then export or play.
///
/// @param argv - Arguments after the program name, empty to resume
/// @param out - Receives the song summaries and the kill message
fn run<D, W>( argv: Vec<String>, config: &PlayerConfig, driver: &mut D, interrupt: &Interrupt, out: &mut W ) -> Result<()>
where
    D: PlaybackDriver,
    W: Write,
{
    let store = RestartStore::from_config( config );

    let invocation = if argv.is_empty() {
        Invocation::restore( &store )?
    } else {
        Invocation::fresh( argv )
    };

    let mut session = new_session( config );
    session.set_phase( SessionPhase::Expanding );
    let songs = expand( config, &invocation.args, &mut io::stderr() )?;

    if let Some( path ) = &invocation.args.playlist {
        playlist::export( path, &songs, None ).context( "cannot write playlist" )?;
        return Ok(());
    }
    session.set_queue( songs );

    let quiet = invocation.args.quiet;
    let outcome = run_session( config, &store, invocation, session, driver, interrupt, out )?;

    if outcome == RunOutcome::Interrupted && !quiet {
        writeln!( out, "mp: killed at user request." )?;
    }
    Ok(())
}


fn main() -> Result<()> {
    init_logging();

    let argv: Vec<String> = std::env::args_os()
        .skip( 1 )
        .map( |a| a.to_string_lossy().into_owned() )
        .collect();

    let config = settings::load();
    let interrupt = signal::install().context( "cannot listen for termination signals" )?;

    run( argv, &config, &mut AudioPlayer::default(), &interrupt, &mut io::stdout().lock() )
}


#[cfg( test )]
mod tests {
    use super::*;

    use std::fs;
    use std::path::Path;

    use mp_core::{ PlayOutcome, PlayerError };
    use tempfile::TempDir;


    /// Plays instantly, raising the interrupt when asked to play `stop_at`.
    struct FakeDriver {
        played: Vec<PathBuf>,
        stop_at: Option<PathBuf>,
    }


    impl PlaybackDriver for FakeDriver {
        fn play( &mut self, path: &Path, interrupt: &Interrupt ) -> Result<PlayOutcome, PlayerError> {
            self.played.push( path.to_path_buf() );
            if self.stop_at.as_deref() == Some( path ) {
                interrupt.trigger();
                return Ok( PlayOutcome::Interrupted );
            }
            Ok( PlayOutcome::Finished )
        }
    }


    fn test_config( dir: &TempDir ) -> PlayerConfig {
        PlayerConfig {
            restart_path: dir.path().join( ".mp-restart" ),
            now_playing_path: None,
            ..PlayerConfig::default()
        }
    }


    fn library( dir: &TempDir ) -> PathBuf {
        let music = dir.path().join( "music" );
        fs::create_dir( &music ).unwrap();
        for name in [ "a.mp3", "b.mp3", "c.mp3" ] {
            fs::write( music.join( name ), b"" ).unwrap();
        }
        music
    }


    fn arg( path: &Path ) -> String {
        path.to_string_lossy().into_owned()
    }


    /// Runs `argv` against a fake driver, returning the result and stdout.
    fn invoke( config: &PlayerConfig, argv: Vec<String>, driver: &mut FakeDriver ) -> ( Result<()>, String ) {
        let mut out = Vec::new();
        let result = run( argv, config, driver, &Interrupt::new(), &mut out );
        ( result, String::from_utf8( out ).unwrap() )
    }


    fn driver( stop_at: Option<PathBuf> ) -> FakeDriver {
        FakeDriver { played: Vec::new(), stop_at }
    }


    #[test]
    fn test_interrupted_run_resumes_without_arguments() {
        let dir = TempDir::new().unwrap();
        let config = test_config( &dir );
        let music = library( &dir );

        let mut first = driver( Some( music.join( "b.mp3" ) ) );
        let ( result, out ) = invoke( &config, vec![ arg( &music ) ], &mut first );
        result.unwrap();
        assert_eq!( first.played, vec![ music.join( "a.mp3" ), music.join( "b.mp3" ) ] );
        assert!( out.ends_with( "mp: killed at user request.\n" ) );

        let record = RestartStore::from_config( &config ).load().unwrap();
        assert_eq!( record.args, vec![ arg( &music ) ] );
        assert_eq!( record.skip, vec![ music.join( "a.mp3" ), music.join( "b.mp3" ) ] );

        let mut second = driver( None );
        let ( result, out ) = invoke( &config, Vec::new(), &mut second );
        result.unwrap();
        assert_eq!( second.played, vec![ music.join( "c.mp3" ) ] );
        assert!( !out.contains( "killed" ) );
    }


    #[test]
    fn test_restored_flags_are_honored() {
        let dir = TempDir::new().unwrap();
        let config = test_config( &dir );
        let music = library( &dir );

        let ( result, out ) = invoke(
            &config,
            vec![ "-q".to_string(), arg( &music ) ],
            &mut driver( Some( music.join( "a.mp3" ) ) ),
        );
        result.unwrap();
        assert!( out.is_empty() );

        let resumed = Invocation::restore( &RestartStore::from_config( &config ) ).unwrap();
        assert!( resumed.args.quiet );
        assert_eq!( resumed.args.songs, vec![ arg( &music ) ] );

        let ( result, out ) = invoke( &config, Vec::new(), &mut driver( None ) );
        result.unwrap();
        assert!( out.is_empty() );
    }


    #[test]
    fn test_completed_run_saves_empty_skip_list() {
        let dir = TempDir::new().unwrap();
        let config = test_config( &dir );
        let music = library( &dir );
        let mut player = driver( None );

        let ( result, out ) = invoke( &config, vec![ arg( &music ) ], &mut player );
        result.unwrap();
        assert_eq!( player.played.len(), 3 );
        assert_eq!( out.lines().count(), 3 );

        let record = RestartStore::from_config( &config ).load().unwrap();
        assert!( record.skip.is_empty() );
    }


    #[test]
    fn test_resume_without_restart_file() {
        let dir = TempDir::new().unwrap();
        let config = test_config( &dir );

        let ( result, _ ) = invoke( &config, Vec::new(), &mut driver( None ) );

        let err = result.err().unwrap();
        assert!( err.to_string().contains( "previous session information not found" ) );
        assert!( !config.restart_path.exists() );
    }


    #[test]
    fn test_empty_directory_writes_no_restart_file() {
        let dir = TempDir::new().unwrap();
        let config = test_config( &dir );
        let empty = dir.path().join( "empty" );
        fs::create_dir( &empty ).unwrap();
        let mut player = driver( None );

        let ( result, _ ) = invoke( &config, vec![ "-q".to_string(), arg( &empty ) ], &mut player );

        let err = result.err().unwrap();
        assert!( matches!( err.downcast_ref::<ExpandError>(), Some( ExpandError::EmptyQueue { .. } ) ) );
        assert!( player.played.is_empty() );
        assert!( !config.restart_path.exists() );
    }


    #[test]
    fn test_empty_queue_keeps_previous_restart_file() {
        let dir = TempDir::new().unwrap();
        let config = test_config( &dir );
        let previous = "old.mp3\n### skip the following songs ###\nold.mp3\n";
        fs::write( &config.restart_path, previous ).unwrap();

        let ( result, _ ) = invoke( &config, vec![ "-q".to_string(), arg( &dir.path().join( "gone.mp3" ) ) ], &mut driver( None ) );

        assert!( result.is_err() );
        assert_eq!( fs::read_to_string( &config.restart_path ).unwrap(), previous );
    }


    #[test]
    fn test_export_leaves_restart_file_untouched() {
        let dir = TempDir::new().unwrap();
        let config = test_config( &dir );
        let music = library( &dir );
        let previous = "old.mp3\n### skip the following songs ###\n";
        fs::write( &config.restart_path, previous ).unwrap();
        let list = dir.path().join( "out.m3u" );
        let mut player = driver( None );

        let ( result, out ) = invoke( &config, vec![ "-p".to_string(), arg( &list ), arg( &music ) ], &mut player );
        result.unwrap();

        assert!( out.is_empty() );
        assert!( player.played.is_empty() );
        assert_eq!( fs::read_to_string( &config.restart_path ).unwrap(), previous );
        assert_eq!( fs::read_to_string( &list ).unwrap().lines().count(), 3 );
    }


    #[test]
    fn test_expand_reports_skipped_inputs() {
        let dir = TempDir::new().unwrap();
        let config = test_config( &dir );
        let music = library( &dir );
        let gone = dir.path().join( "gone.mp3" );
        let mut err = Vec::new();

        let args = Args::try_parse_from( [ "mp".to_string(), arg( &gone ), arg( &music ) ] ).unwrap();
        assert_eq!( expand( &config, &args, &mut err ).unwrap().len(), 3 );
        assert_eq!( String::from_utf8( err ).unwrap(), format!( "mp: {}: not found.\n", gone.display() ) );

        let mut err = Vec::new();
        let args = Args::try_parse_from( [ "mp".to_string(), "-q".to_string(), arg( &gone ) ] ).unwrap();
        assert!( matches!( expand( &config, &args, &mut err ), Err( ExpandError::EmptyQueue { .. } ) ) );
        assert!( err.is_empty() );
    }


    /// A writer whose every write fails.
    struct Broken;


    impl Write for Broken {
        fn write( &mut self, _buf: &[u8] ) -> io::Result<usize> {
            Err( io::Error::new( io::ErrorKind::BrokenPipe, "closed" ) )
        }

        fn flush( &mut self ) -> io::Result<()> {
            Ok(())
        }
    }


    #[test]
    fn test_report_skipped_survives_closed_stderr() {
        let skipped = vec![ Skipped::NotFound( PathBuf::from( "a.mp3" ) ), Skipped::Cycle( PathBuf::from( "b" ) ) ];
        report_skipped( &skipped, &mut Broken );
    }
}
