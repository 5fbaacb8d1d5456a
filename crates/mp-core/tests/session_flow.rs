//! End-to-end session tests: expansion, playback loop and restart file,
//! with a scripted driver standing in for the audio device.

use std::fs;
use std::path::{ Path, PathBuf };

use mp_core::{
    play_session, Interrupt, MetadataReader, PathExpander, PlayOutcome, Playback, PlaybackDriver,
    PlaybackOptions, PlayerConfig, PlayerError, RecordPolicy, RestartStore, RunOutcome,
    SessionPhase, SessionState,
};
use tempfile::TempDir;


/// Records every song it is asked to play and misbehaves on request.
#[derive( Default )]
struct ScriptedDriver {
    played: Vec<PathBuf>,
    fail: Vec<PathBuf>,
    // Raise the interrupt during the nth call (1-based)
    interrupt_at: Option<usize>,
}


impl PlaybackDriver for ScriptedDriver {
    fn play( &mut self, path: &Path, interrupt: &Interrupt ) -> Result<PlayOutcome, PlayerError> {
        self.played.push( path.to_path_buf() );

        if self.interrupt_at == Some( self.played.len() ) {
            interrupt.trigger();
            return Ok( PlayOutcome::Interrupted );
        }
        if self.fail.iter().any( |f| f == path ) {
            return Err( PlayerError::Decode( "corrupt stream".into() ) );
        }
        Ok( PlayOutcome::Finished )
    }
}


fn songs( names: &[&str] ) -> Vec<PathBuf> {
    names.iter().map( PathBuf::from ).collect()
}


fn bare_reader() -> MetadataReader {
    MetadataReader::with_extractors( &PlayerConfig::default(), Vec::new() )
}


fn run(
    session: &mut SessionState,
    driver: &mut ScriptedDriver,
    options: &PlaybackOptions,
) -> ( RunOutcome, String ) {
    let metadata = bare_reader();
    let interrupt = Interrupt::new();
    let mut out = Vec::new();

    let outcome = play_session(
        session,
        Playback { driver, metadata: &metadata, interrupt: &interrupt, options },
        &mut out,
    );
    ( outcome, String::from_utf8( out ).unwrap() )
}


#[test]
fn test_interrupted_song_is_skipped_on_resume_when_recorded_before_play() {
    let mut session = SessionState::new( RecordPolicy::BeforePlay );
    session.set_queue( songs( &[ "a.mp3", "b.mp3", "c.mp3" ] ) );
    let mut driver = ScriptedDriver { interrupt_at: Some( 2 ), ..Default::default() };

    let ( outcome, _ ) = run( &mut session, &mut driver, &PlaybackOptions::default() );

    assert_eq!( outcome, RunOutcome::Interrupted );
    assert_eq!( session.phase(), SessionPhase::Interrupted );
    assert_eq!( session.already_played(), songs( &[ "a.mp3", "b.mp3" ] ) );
}


#[test]
fn test_interrupted_song_is_replayed_on_resume_when_recorded_after_play() {
    let mut session = SessionState::new( RecordPolicy::AfterPlay );
    session.set_queue( songs( &[ "a.mp3", "b.mp3", "c.mp3" ] ) );
    let mut driver = ScriptedDriver { interrupt_at: Some( 2 ), ..Default::default() };

    let ( outcome, _ ) = run( &mut session, &mut driver, &PlaybackOptions::default() );

    assert_eq!( outcome, RunOutcome::Interrupted );
    assert_eq!( session.already_played(), songs( &[ "a.mp3" ] ) );
}


#[test]
fn test_resume_from_restart_file_skips_played_songs() {
    let dir = TempDir::new().unwrap();
    let x = dir.path().join( "x.mp3" );
    let y = dir.path().join( "y.mp3" );
    fs::write( &x, b"" ).unwrap();
    fs::write( &y, b"" ).unwrap();

    let config = PlayerConfig {
        restart_path: dir.path().join( ".mp-restart" ),
        ..PlayerConfig::default()
    };
    fs::write(
        &config.restart_path,
        format!( "{}\n{}\n### skip the following songs ###\n{}", x.display(), y.display(), x.display() ),
    ).unwrap();

    let store = RestartStore::from_config( &config );
    let record = store.load().unwrap();
    assert_eq!( record.args, vec![ x.display().to_string(), y.display().to_string() ] );
    assert_eq!( record.skip, vec![ x.clone() ] );

    let expansion = PathExpander::new( &config ).expand( &record.args, None ).unwrap();
    let mut session = SessionState::new( RecordPolicy::BeforePlay );
    session.set_queue( expansion.songs );
    session.set_skip( record.skip );
    let mut driver = ScriptedDriver::default();

    let ( outcome, _ ) = run( &mut session, &mut driver, &PlaybackOptions::default() );

    assert_eq!( outcome, RunOutcome::Finished );
    assert_eq!( driver.played, vec![ y ] );
}


#[test]
fn test_interrupt_then_resume_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = RestartStore::new( dir.path().join( ".mp-restart" ), "### skip the following songs ###" );
    let args = vec![ "a.mp3".to_string(), "b.mp3".to_string(), "c.mp3".to_string() ];

    // First run: killed during the second song
    let mut session = SessionState::new( RecordPolicy::BeforePlay );
    session.set_queue( songs( &[ "a.mp3", "b.mp3", "c.mp3" ] ) );
    let mut driver = ScriptedDriver { interrupt_at: Some( 2 ), ..Default::default() };
    run( &mut session, &mut driver, &PlaybackOptions::default() );
    store.save( &args, &session.already_played() ).unwrap();

    // Second run: resumes with the third song, then finishes the pass
    let record = store.load().unwrap();
    assert_eq!( record.args, args );
    let mut session = SessionState::new( RecordPolicy::BeforePlay );
    session.set_queue( record.args.iter().map( PathBuf::from ).collect() );
    session.set_skip( record.skip );
    let mut driver = ScriptedDriver::default();
    let ( outcome, _ ) = run( &mut session, &mut driver, &PlaybackOptions::default() );
    store.save( &record.args, &session.already_played() ).unwrap();

    assert_eq!( outcome, RunOutcome::Finished );
    assert_eq!( driver.played, songs( &[ "c.mp3" ] ) );
    assert!( store.load().unwrap().skip.is_empty() );
}


#[test]
fn test_second_interrupt_accumulates_skip_list() {
    let mut session = SessionState::new( RecordPolicy::AfterPlay );
    session.set_queue( songs( &[ "a.mp3", "b.mp3", "c.mp3", "d.mp3" ] ) );
    session.set_skip( songs( &[ "a.mp3" ] ) );
    let mut driver = ScriptedDriver { interrupt_at: Some( 2 ), ..Default::default() };

    run( &mut session, &mut driver, &PlaybackOptions::default() );

    assert_eq!( driver.played, songs( &[ "b.mp3", "c.mp3" ] ) );
    assert_eq!( session.already_played(), songs( &[ "a.mp3", "b.mp3" ] ) );
}


#[test]
fn test_backend_error_advances_to_next_song() {
    let mut session = SessionState::new( RecordPolicy::AfterPlay );
    session.set_queue( songs( &[ "bad.mp3", "good.mp3" ] ) );
    let mut driver = ScriptedDriver { fail: songs( &[ "bad.mp3" ] ), ..Default::default() };

    let ( outcome, _ ) = run( &mut session, &mut driver, &PlaybackOptions::default() );

    assert_eq!( outcome, RunOutcome::Finished );
    assert_eq!( driver.played, songs( &[ "bad.mp3", "good.mp3" ] ) );
}


#[test]
fn test_finished_pass_clears_already_played() {
    let mut session = SessionState::new( RecordPolicy::BeforePlay );
    session.set_queue( songs( &[ "a.mp3", "b.mp3" ] ) );
    session.set_skip( songs( &[ "a.mp3" ] ) );
    let mut driver = ScriptedDriver::default();

    let ( outcome, _ ) = run( &mut session, &mut driver, &PlaybackOptions::default() );

    assert_eq!( outcome, RunOutcome::Finished );
    assert_eq!( session.phase(), SessionPhase::Finished );
    assert!( session.already_played().is_empty() );
}


#[test]
fn test_repeat_starts_over_without_skips() {
    let mut session = SessionState::new( RecordPolicy::BeforePlay );
    session.set_queue( songs( &[ "a.mp3", "b.mp3" ] ) );
    session.set_skip( songs( &[ "a.mp3" ] ) );
    let mut driver = ScriptedDriver { interrupt_at: Some( 5 ), ..Default::default() };
    let options = PlaybackOptions { repeat: true, ..Default::default() };

    let ( outcome, _ ) = run( &mut session, &mut driver, &options );

    assert_eq!( outcome, RunOutcome::Interrupted );
    assert_eq!( driver.played, songs( &[ "b.mp3", "a.mp3", "b.mp3", "a.mp3", "b.mp3" ] ) );
    assert_eq!( session.already_played(), songs( &[ "a.mp3", "b.mp3" ] ) );
}


#[test]
fn test_shuffle_with_repeat_plays_every_song_each_pass() {
    let queue = songs( &[ "1.mp3", "2.mp3", "3.mp3", "4.mp3", "5.mp3" ] );
    let mut session = SessionState::new( RecordPolicy::BeforePlay );
    session.set_queue( queue.clone() );
    let mut driver = ScriptedDriver { interrupt_at: Some( 12 ), ..Default::default() };
    let options = PlaybackOptions { repeat: true, shuffle: true, ..Default::default() };

    run( &mut session, &mut driver, &options );

    for pass in driver.played[ ..10 ].chunks( 5 ) {
        let mut pass = pass.to_vec();
        pass.sort();
        assert_eq!( pass, queue );
    }
    assert_eq!( session.already_played(), driver.played[ 10.. ].to_vec() );
}


#[test]
fn test_repeat_stops_when_every_song_fails() {
    let mut session = SessionState::new( RecordPolicy::AfterPlay );
    session.set_queue( songs( &[ "a.mp3", "b.mp3" ] ) );
    let mut driver = ScriptedDriver { fail: songs( &[ "a.mp3", "b.mp3" ] ), ..Default::default() };
    let options = PlaybackOptions { repeat: true, ..Default::default() };

    let ( outcome, _ ) = run( &mut session, &mut driver, &options );

    assert_eq!( outcome, RunOutcome::Finished );
    assert_eq!( driver.played.len(), 2 );
}


#[test]
fn test_interrupt_before_start_plays_nothing() {
    let mut session = SessionState::new( RecordPolicy::BeforePlay );
    session.set_queue( songs( &[ "a.mp3" ] ) );
    let mut driver = ScriptedDriver::default();
    let metadata = bare_reader();
    let interrupt = Interrupt::new();
    interrupt.trigger();
    let options = PlaybackOptions::default();

    let outcome = play_session(
        &mut session,
        Playback { driver: &mut driver, metadata: &metadata, interrupt: &interrupt, options: &options },
        &mut Vec::new(),
    );

    assert_eq!( outcome, RunOutcome::Interrupted );
    assert!( driver.played.is_empty() );
    assert!( session.already_played().is_empty() );
}


#[test]
fn test_display_and_quiet() {
    let mut session = SessionState::default();
    session.set_queue( songs( &[ "music/a.mp3", "music/b.mp3" ] ) );
    let ( _, shown ) = run( &mut session, &mut ScriptedDriver::default(), &PlaybackOptions::default() );
    assert_eq!( shown, "music/a.mp3\nmusic/b.mp3\n" );

    let quiet = PlaybackOptions { quiet: true, ..Default::default() };
    let ( _, shown ) = run( &mut session, &mut ScriptedDriver::default(), &quiet );
    assert!( shown.is_empty() );
}


#[test]
fn test_now_playing_file_is_written() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join( ".nowplaying" );
    fs::write( &target, "stale" ).unwrap();

    let mut session = SessionState::default();
    session.set_queue( songs( &[ "a.mp3" ] ) );
    let options = PlaybackOptions { now_playing_path: Some( target.clone() ), ..Default::default() };
    run( &mut session, &mut ScriptedDriver::default(), &options );

    // No tags available, so the status is cleared
    assert_eq!( fs::read_to_string( &target ).unwrap(), "" );
}


#[test]
fn test_now_playing_failure_is_not_fatal() {
    let dir = TempDir::new().unwrap();
    let mut session = SessionState::default();
    session.set_queue( songs( &[ "a.mp3" ] ) );
    let options = PlaybackOptions {
        now_playing_path: Some( dir.path().join( "missing/.nowplaying" ) ),
        ..Default::default()
    };
    let mut driver = ScriptedDriver::default();

    let ( outcome, _ ) = run( &mut session, &mut driver, &options );

    assert_eq!( outcome, RunOutcome::Finished );
    assert_eq!( driver.played.len(), 1 );
}
