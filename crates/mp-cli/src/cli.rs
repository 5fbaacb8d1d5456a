//! Command-line argument parsing for mp.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;


/// mp - play music files, directories and m3u playlists.
///
/// Run with no arguments to resume the previous session from the restart
/// file in the current directory.
#[derive( Parser, Debug, Clone, PartialEq, Eq )]
#[command( name = "mp" )]
#[command( version, about, long_about = None )]
pub struct Args {
    /// Do not print the name of each song as it plays.
    #[arg( short, long )]
    pub quiet: bool,

    /// Start over after the last song.
    #[arg( short, long )]
    pub repeat: bool,

    /// Shuffle the songs, again before every repeat.
    #[arg( short, long )]
    pub shuffle: bool,

    /// Write the songs to a playlist file instead of playing them.
    #[arg( short, long, value_name = "FILE" )]
    pub playlist: Option<PathBuf>,

    /// Songs, directories and playlists to play.
    pub songs: Vec<String>,
}


impl Args {
    /// Parses arguments restored from the restart file.
    pub fn from_restored( args: &[String] ) -> Result<Self, clap::Error> {
        let argv = std::iter::once( OsString::from( "mp" ) )
            .chain( args.iter().map( OsString::from ) );
        Self::try_parse_from( argv )
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_flags_and_songs() {
        let args = Args::try_parse_from( [ "mp", "-rs", "a.mp3", "music" ] ).unwrap();
        assert!( args.repeat );
        assert!( args.shuffle );
        assert!( !args.quiet );
        assert_eq!( args.songs, vec![ "a.mp3", "music" ] );
        assert_eq!( args.playlist, None );
    }


    #[test]
    fn test_flags_after_songs() {
        let args = Args::try_parse_from( [ "mp", "music", "--quiet" ] ).unwrap();
        assert!( args.quiet );
        assert_eq!( args.songs, vec![ "music" ] );
    }


    #[test]
    fn test_playlist_export() {
        let args = Args::try_parse_from( [ "mp", "-p", "out.m3u", "music" ] ).unwrap();
        assert_eq!( args.playlist, Some( PathBuf::from( "out.m3u" ) ) );
        assert_eq!( args.songs, vec![ "music" ] );
    }


    #[test]
    fn test_from_restored() {
        let restored = vec![ "-r".to_string(), "my songs".to_string() ];
        let args = Args::from_restored( &restored ).unwrap();
        assert!( args.repeat );
        assert_eq!( args.songs, vec![ "my songs" ] );
    }


    #[test]
    fn test_from_restored_rejects_unknown_flag() {
        assert!( Args::from_restored( &[ "--bogus".to_string() ] ).is_err() );
    }
}
