//! Player configuration
//!
//! Settings shared by the expander, the restart store and the player loop.
//! Loaded from the user's settings file by the CLI, defaults otherwise.

use std::path::{ Path, PathBuf };

use serde::{ Deserialize, Serialize };


/// Media extensions recognized by default (lower case, without the dot).
pub const DEFAULT_MEDIA_EXTENSIONS: &[&str] = &[
    "flac", "mp3", "ogg", "oga", "wav", "m4a", "m4b",
];

/// Separator between the argument and skip sections of the restart file.
pub const RESTART_SEPARATOR: &str = "### skip the following songs ###";

/// Restart file name, relative to the working directory.
pub const RESTART_FILENAME: &str = ".mp-restart";


/// Configuration shared by the expander, the restart store and the player loop.
#[derive( Debug, Clone, PartialEq, Eq, Serialize, Deserialize )]
#[serde( default )]
pub struct PlayerConfig {
    /// Extensions treated as playable media.
    pub media_extensions: Vec<String>,

    /// Extension of playlist files.
    pub playlist_extension: String,

    /// Playlist lines starting with this marker are ignored.
    pub comment_marker: String,

    /// Location of the restart file.
    pub restart_path: PathBuf,

    /// Line separating saved arguments from the songs to skip.
    pub separator: String,

    /// File that receives "artist - title" for the current song.
    pub now_playing_path: Option<PathBuf>,

    /// When set, a song is recorded as played as soon as it starts, so a
    /// song interrupted mid-way is not replayed on resume.
    pub skip_song_that_was_playing_when_last_killed: bool,

    /// Include the album in the song summary.
    pub show_album: bool,

    /// Include the track number in the song summary.
    pub show_track: bool,
}


impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            media_extensions: DEFAULT_MEDIA_EXTENSIONS.iter().map( |e| e.to_string() ).collect(),
            playlist_extension: "m3u".to_string(),
            comment_marker: "#".to_string(),
            restart_path: PathBuf::from( RESTART_FILENAME ),
            separator: RESTART_SEPARATOR.to_string(),
            now_playing_path: dirs::home_dir().map( |h| h.join( ".nowplaying" ) ),
            skip_song_that_was_playing_when_last_killed: true,
            show_album: true,
            show_track: false,
        }
    }
}


impl PlayerConfig {
    /// Returns true if the path has one of the configured media extensions.
    pub fn is_media_file( &self, path: &Path ) -> bool {
        extension_of( path )
            .map( |ext| self.media_extensions.iter().any( |m| normalize_extension( m ) == ext ) )
            .unwrap_or( false )
    }


    /// Returns true if the path has the playlist extension.
    pub fn is_playlist_file( &self, path: &Path ) -> bool {
        extension_of( path )
            .map( |ext| normalize_extension( &self.playlist_extension ) == ext )
            .unwrap_or( false )
    }


    /// Returns true if the path names the restart file (compared by file name).
    pub fn is_restart_file( &self, path: &Path ) -> bool {
        match ( path.file_name(), self.restart_path.file_name() ) {
            ( Some( name ), Some( restart ) ) => name == restart,
            _ => false,
        }
    }
}


/// Lower-cased extension of a path, if it has a UTF-8 one.
fn extension_of( path: &Path ) -> Option<String> {
    path.extension()
        .and_then( |e| e.to_str() )
        .map( |e| e.to_lowercase() )
}


/// Accepts both "mp3" and ".mp3" in configuration files.
fn normalize_extension( ext: &str ) -> String {
    ext.trim_start_matches( '.' ).to_lowercase()
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_media_extension_is_case_insensitive() {
        let config = PlayerConfig::default();
        assert!( config.is_media_file( Path::new( "a/Song.MP3" ) ) );
        assert!( config.is_media_file( Path::new( "b.flac" ) ) );
        assert!( !config.is_media_file( Path::new( "notes.txt" ) ) );
        assert!( !config.is_media_file( Path::new( "noext" ) ) );
    }


    #[test]
    fn test_playlist_is_not_media() {
        let config = PlayerConfig::default();
        assert!( config.is_playlist_file( Path::new( "mix/list.M3U" ) ) );
        assert!( !config.is_media_file( Path::new( "mix/list.m3u" ) ) );
    }


    #[test]
    fn test_dotted_extensions_accepted() {
        let config = PlayerConfig {
            media_extensions: vec![ ".opus".to_string() ],
            ..PlayerConfig::default()
        };
        assert!( config.is_media_file( Path::new( "x.opus" ) ) );
        assert!( !config.is_media_file( Path::new( "x.mp3" ) ) );
    }


    #[test]
    fn test_restart_file_detection() {
        let config = PlayerConfig::default();
        assert!( config.is_restart_file( Path::new( "some/dir/.mp-restart" ) ) );
        assert!( !config.is_restart_file( Path::new( "some/dir/song.mp3" ) ) );
    }
}
