//! Settings file management
//!
//! Reads the player configuration from `<config dir>/mp/settings.json`.
//! Missing fields take their defaults.

use std::fs;
use std::io::ErrorKind;
use std::path::{ Path, PathBuf };

use mp_core::PlayerConfig;


/// Returns the path to the settings file.
pub fn settings_path() -> Option<PathBuf> {
    dirs::config_dir().map( |p| p.join( "mp" ).join( "settings.json" ) )
}


/// Loads settings from the default location, or returns defaults.
pub fn load() -> PlayerConfig {
    match settings_path() {
        Some( path ) => load_from( &path ),
        None => PlayerConfig::default(),
    }
}


/// Loads settings from `path`, or returns defaults if it is missing or invalid.
pub fn load_from( path: &Path ) -> PlayerConfig {
    let contents = match fs::read_to_string( path ) {
        Ok( c ) => c,
        Err( e ) if e.kind() == ErrorKind::NotFound => return PlayerConfig::default(),
        Err( e ) => {
            tracing::warn!( "Failed to read settings {:?}: {}", path, e );
            return PlayerConfig::default();
        }
    };

    match serde_json::from_str( &contents ) {
        Ok( config ) => {
            tracing::debug!( "Loaded settings from {:?}", path );
            config
        }
        Err( e ) => {
            tracing::warn!( "Ignoring invalid settings {:?}: {}", path, e );
            PlayerConfig::default()
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;

    use tempfile::TempDir;


    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        assert_eq!( load_from( &dir.path().join( "settings.json" ) ), PlayerConfig::default() );
    }


    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join( "settings.json" );
        fs::write( &path, r#"{ "show_track": true, "media_extensions": [ "mp3" ] }"# ).unwrap();

        let config = load_from( &path );

        assert!( config.show_track );
        assert_eq!( config.media_extensions, vec![ "mp3" ] );
        assert_eq!( config.separator, PlayerConfig::default().separator );
        assert!( config.skip_song_that_was_playing_when_last_killed );
    }


    #[test]
    fn test_invalid_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join( "settings.json" );
        fs::write( &path, "not json" ).unwrap();

        assert_eq!( load_from( &path ), PlayerConfig::default() );
    }


    #[test]
    fn test_now_playing_can_be_disabled() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join( "settings.json" );
        fs::write( &path, r#"{ "now_playing_path": null }"# ).unwrap();

        assert_eq!( load_from( &path ).now_playing_path, None );
    }
}
