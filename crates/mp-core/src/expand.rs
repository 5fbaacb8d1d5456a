//! Input expansion
//!
//! Turns the command-line arguments (files, directories and m3u playlists)
//! into the flat, ordered list of songs that make up the queue.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{ Path, PathBuf };

use thiserror::Error;

use crate::config::PlayerConfig;


/// Errors that end expansion.
#[derive( Debug, Error )]
pub enum ExpandError {
    /// Nothing playable was found. Carries the inputs that were skipped.
    #[error( "playlist is empty." )]
    EmptyQueue { skipped: Vec<Skipped> },
}


/// An input that was passed over while expanding.
#[derive( Debug, Clone, PartialEq, Eq )]
pub enum Skipped {
    /// Neither a file nor a directory exists at this path.
    NotFound( PathBuf ),

    /// A file that is neither media nor a playlist.
    UnknownType( PathBuf ),

    /// A playlist or directory that could not be read.
    Unreadable { path: PathBuf, reason: String },

    /// A playlist or directory that is already being expanded further up.
    Cycle( PathBuf ),
}


impl fmt::Display for Skipped {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        match self {
            Skipped::NotFound( p ) => write!( f, "{}: not found.", p.display() ),
            Skipped::UnknownType( p ) => {
                write!( f, "{}: skipping descriptor of unknown type.", p.display() )
            }
            Skipped::Unreadable { path, reason } => write!( f, "{}: {}.", path.display(), reason ),
            Skipped::Cycle( p ) => write!( f, "{}: already being expanded, skipping.", p.display() ),
        }
    }
}


/// Result of a successful expansion.
#[derive( Debug, Clone, Default, PartialEq, Eq )]
pub struct Expansion {
    /// Songs in play order.
    pub songs: Vec<PathBuf>,

    /// Inputs that were skipped, in the order they were met.
    pub skipped: Vec<Skipped>,
}


/// Expands inputs into songs using the extensions from a [`PlayerConfig`].
pub struct PathExpander<'a> {
    config: &'a PlayerConfig,
}


impl<'a> PathExpander<'a> {
    /// Creates an expander for the given configuration.
    pub fn new( config: &'a PlayerConfig ) -> Self {
        Self { config }
    }


    /// Expands `inputs` depth first.
    ///
    /// Relative inputs are resolved against `base_dir`, or left relative to
    /// the working directory when it is `None`. Directories are walked in
    /// sorted order, playlists are expanded relative to their own directory.
    ///
    /// @returns `ExpandError::EmptyQueue` when nothing playable was found
    pub fn expand<I, S>( &self, inputs: I, base_dir: Option<&Path> ) -> Result<Expansion, ExpandError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut walk = Walk {
            config: self.config,
            expansion: Expansion::default(),
            active: Vec::new(),
        };

        for input in inputs {
            let input = input.as_ref().trim();
            if input.is_empty() {
                continue;
            }
            walk.visit( resolve( input, base_dir ) );
        }

        let expansion = walk.expansion;
        tracing::info!(
            "Expanded to {} songs ({} inputs skipped)",
            expansion.songs.len(),
            expansion.skipped.len()
        );

        if expansion.songs.is_empty() {
            return Err( ExpandError::EmptyQueue { skipped: expansion.skipped } );
        }
        Ok( expansion )
    }
}


/// Mutable state of one expansion.
struct Walk<'a> {
    config: &'a PlayerConfig,
    expansion: Expansion,
    // Canonical paths of the playlists and directories currently open
    active: Vec<PathBuf>,
}


impl Walk<'_> {
    fn visit( &mut self, path: PathBuf ) {
        let metadata = match fs::metadata( &path ) {
            Ok( m ) => m,
            Err( e ) if e.kind() == ErrorKind::NotFound => {
                self.skip( Skipped::NotFound( path ) );
                return;
            }
            Err( e ) => {
                self.skip( Skipped::Unreadable { path, reason: e.to_string() } );
                return;
            }
        };

        if metadata.is_file() {
            if self.config.is_media_file( &path ) {
                tracing::debug!( "Queued: {:?}", path );
                self.expansion.songs.push( path );
            } else if self.config.is_playlist_file( &path ) {
                self.nested( path, Self::visit_playlist );
            } else if self.config.is_restart_file( &path ) {
                tracing::debug!( "Ignoring restart file: {:?}", path );
            } else {
                self.skip( Skipped::UnknownType( path ) );
            }
        } else if metadata.is_dir() {
            self.nested( path, Self::visit_directory );
        } else {
            self.skip( Skipped::UnknownType( path ) );
        }
    }


    /// Runs `expand` on a playlist or directory unless it is already open.
    fn nested( &mut self, path: PathBuf, expand: fn( &mut Self, &Path ) ) {
        let key = fs::canonicalize( &path ).unwrap_or_else( |_| path.clone() );
        if self.active.contains( &key ) {
            self.skip( Skipped::Cycle( path ) );
            return;
        }

        self.active.push( key );
        expand( self, &path );
        self.active.pop();
    }


    fn visit_playlist( &mut self, path: &Path ) {
        let contents = match fs::read_to_string( path ) {
            Ok( c ) => c,
            Err( e ) => {
                self.skip( Skipped::Unreadable { path: path.to_path_buf(), reason: e.to_string() } );
                return;
            }
        };

        tracing::debug!( "Reading playlist: {:?}", path );
        let base = path.parent().unwrap_or( Path::new( "" ) );
        let marker = self.config.comment_marker.as_str();

        for line in contents.lines() {
            let trimmed = line.trim();

            // Skip empty lines and comments
            if trimmed.is_empty() || ( !marker.is_empty() && trimmed.starts_with( marker ) ) {
                continue;
            }

            self.visit( resolve( trimmed, Some( base ) ) );
        }
    }


    fn visit_directory( &mut self, dir: &Path ) {
        let entries = match fs::read_dir( dir ) {
            Ok( e ) => e,
            Err( e ) => {
                self.skip( Skipped::Unreadable { path: dir.to_path_buf(), reason: e.to_string() } );
                return;
            }
        };

        let mut paths: Vec<PathBuf> = entries.flatten().map( |entry| entry.path() ).collect();
        paths.sort();

        for path in paths {
            self.visit( path );
        }
    }


    fn skip( &mut self, skipped: Skipped ) {
        tracing::debug!( "{}", skipped );
        self.expansion.skipped.push( skipped );
    }
}


/// Resolves an input against `base`, expanding a leading `~`.
fn resolve( input: &str, base: Option<&Path> ) -> PathBuf {
    let path = expand_home( input );
    match base {
        Some( base ) => base.join( path ),
        None => path,
    }
}


fn expand_home( input: &str ) -> PathBuf {
    if input == "~" {
        if let Some( home ) = dirs::home_dir() {
            return home;
        }
    } else if let Some( rest ) = input.strip_prefix( "~/" ) {
        if let Some( home ) = dirs::home_dir() {
            return home.join( rest );
        }
    }
    PathBuf::from( input )
}


#[cfg( test )]
mod tests {
    use super::*;

    use std::fs::File;

    use tempfile::TempDir;


    fn touch( path: &Path ) {
        if let Some( parent ) = path.parent() {
            fs::create_dir_all( parent ).unwrap();
        }
        File::create( path ).unwrap();
    }


    fn expand_in( dir: &TempDir, inputs: &[&str] ) -> Result<Expansion, ExpandError> {
        let config = PlayerConfig::default();
        PathExpander::new( &config ).expand( inputs, Some( dir.path() ) )
    }


    #[test]
    fn test_playlist_lines_relative_to_playlist_dir() {
        let dir = TempDir::new().unwrap();
        touch( &dir.path().join( "songA.mp3" ) );
        touch( &dir.path().join( "mix/songC.flac" ) );
        touch( &dir.path().join( "mix/songD.ogg" ) );
        fs::write( dir.path().join( "mix/playlistB.m3u" ), "songC.flac\n#skip\nsongD.ogg" ).unwrap();

        let expansion = expand_in( &dir, &[ "songA.mp3", "mix/playlistB.m3u" ] ).unwrap();

        assert_eq!( expansion.songs, vec![
            dir.path().join( "songA.mp3" ),
            dir.path().join( "mix/songC.flac" ),
            dir.path().join( "mix/songD.ogg" ),
        ]);
        assert!( expansion.skipped.is_empty() );
    }


    #[test]
    fn test_directory_sorted_depth_first() {
        let dir = TempDir::new().unwrap();
        touch( &dir.path().join( "lib/b.mp3" ) );
        touch( &dir.path().join( "lib/a/z.ogg" ) );
        touch( &dir.path().join( "lib/a/y.flac" ) );
        touch( &dir.path().join( "lib/c.wav" ) );

        let expansion = expand_in( &dir, &[ "lib" ] ).unwrap();

        assert_eq!( expansion.songs, vec![
            dir.path().join( "lib/a/y.flac" ),
            dir.path().join( "lib/a/z.ogg" ),
            dir.path().join( "lib/b.mp3" ),
            dir.path().join( "lib/c.wav" ),
        ]);
    }


    #[test]
    fn test_playlist_in_directory_is_expanded_not_queued() {
        let dir = TempDir::new().unwrap();
        touch( &dir.path().join( "lib/one.mp3" ) );
        touch( &dir.path().join( "other/two.mp3" ) );
        fs::write( dir.path().join( "lib/list.m3u" ), "../other/two.mp3\n" ).unwrap();

        let expansion = expand_in( &dir, &[ "lib" ] ).unwrap();

        // list.m3u sorts before one.mp3
        assert_eq!( expansion.songs, vec![
            dir.path().join( "lib" ).join( "../other/two.mp3" ),
            dir.path().join( "lib/one.mp3" ),
        ]);
        assert!( expansion.songs.iter().all( |s| s.extension().unwrap() != "m3u" ) );
    }


    #[test]
    fn test_comments_and_blank_lines_ignored() {
        let dir = TempDir::new().unwrap();
        touch( &dir.path().join( "a.mp3" ) );
        touch( &dir.path().join( "b.mp3" ) );
        fs::write(
            dir.path().join( "list.m3u" ),
            "#EXTM3U\n\n   \n  a.mp3  \n# b.mp3\n#EXTINF:123,Artist - Title\nb.mp3\n",
        ).unwrap();

        let expansion = expand_in( &dir, &[ "list.m3u" ] ).unwrap();

        assert_eq!( expansion.songs, vec![ dir.path().join( "a.mp3" ), dir.path().join( "b.mp3" ) ] );
        assert!( expansion.skipped.is_empty() );
    }


    #[test]
    fn test_unknown_and_missing_are_skipped() {
        let dir = TempDir::new().unwrap();
        touch( &dir.path().join( "cover.jpg" ) );
        touch( &dir.path().join( "song.mp3" ) );

        let expansion = expand_in( &dir, &[ "cover.jpg", "gone.mp3", "song.mp3" ] ).unwrap();

        assert_eq!( expansion.songs, vec![ dir.path().join( "song.mp3" ) ] );
        assert_eq!( expansion.skipped, vec![
            Skipped::UnknownType( dir.path().join( "cover.jpg" ) ),
            Skipped::NotFound( dir.path().join( "gone.mp3" ) ),
        ]);
    }


    #[test]
    fn test_restart_file_skipped_silently() {
        let dir = TempDir::new().unwrap();
        touch( &dir.path().join( ".mp-restart" ) );
        touch( &dir.path().join( "song.ogg" ) );

        let expansion = expand_in( &dir, &[ "." ] ).unwrap();

        assert_eq!( expansion.songs.len(), 1 );
        assert!( expansion.skipped.is_empty() );
    }


    #[test]
    fn test_empty_directory_is_empty_queue() {
        let dir = TempDir::new().unwrap();
        fs::create_dir( dir.path().join( "empty" ) ).unwrap();

        let result = expand_in( &dir, &[ "empty" ] );
        assert!( matches!( result, Err( ExpandError::EmptyQueue { .. } ) ) );
    }


    #[test]
    fn test_empty_queue_keeps_warnings() {
        let dir = TempDir::new().unwrap();

        match expand_in( &dir, &[ "gone.mp3" ] ) {
            Err( ExpandError::EmptyQueue { skipped } ) => {
                assert_eq!( skipped, vec![ Skipped::NotFound( dir.path().join( "gone.mp3" ) ) ] );
            }
            other => panic!( "expected EmptyQueue, got {:?}", other ),
        }
    }


    #[test]
    fn test_self_referencing_playlist_terminates() {
        let dir = TempDir::new().unwrap();
        touch( &dir.path().join( "a.mp3" ) );
        fs::write( dir.path().join( "loop.m3u" ), "a.mp3\nloop.m3u\n" ).unwrap();

        let expansion = expand_in( &dir, &[ "loop.m3u" ] ).unwrap();

        assert_eq!( expansion.songs, vec![ dir.path().join( "a.mp3" ) ] );
        assert_eq!( expansion.skipped, vec![ Skipped::Cycle( dir.path().join( "loop.m3u" ) ) ] );
    }


    #[test]
    fn test_playlist_cycle_through_directory() {
        let dir = TempDir::new().unwrap();
        touch( &dir.path().join( "lib/a.mp3" ) );
        fs::write( dir.path().join( "lib/all.m3u" ), "../lib\n" ).unwrap();

        let expansion = expand_in( &dir, &[ "lib" ] ).unwrap();

        assert_eq!( expansion.songs, vec![ dir.path().join( "lib/a.mp3" ) ] );
        assert_eq!( expansion.skipped.len(), 1 );
        assert!( matches!( expansion.skipped[ 0 ], Skipped::Cycle( _ ) ) );
    }


    #[test]
    fn test_duplicates_are_kept() {
        let dir = TempDir::new().unwrap();
        touch( &dir.path().join( "a.mp3" ) );
        fs::write( dir.path().join( "list.m3u" ), "a.mp3\n" ).unwrap();

        let expansion = expand_in( &dir, &[ "a.mp3", "list.m3u", "list.m3u" ] ).unwrap();

        assert_eq!( expansion.songs, vec![ dir.path().join( "a.mp3" ); 3 ] );
    }


    #[test]
    fn test_relative_inputs_stay_relative_without_base() {
        assert_eq!( resolve( "songA.mp3", None ), PathBuf::from( "songA.mp3" ) );
        assert_eq!( resolve( "songC.flac", Some( Path::new( "mix" ) ) ), PathBuf::from( "mix/songC.flac" ) );
        assert_eq!( resolve( "/abs/x.mp3", Some( Path::new( "mix" ) ) ), PathBuf::from( "/abs/x.mp3" ) );
    }
}
