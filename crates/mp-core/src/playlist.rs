//! Playlist export
//!
//! Writes the expanded queue as a plain m3u file, one absolute path per
//! line, so the playlist expands to the same songs wherever it is saved.

use std::fs::File;
use std::io::{ BufWriter, Write };
use std::path::{ Path, PathBuf };

use thiserror::Error;


/// Errors that can occur writing a playlist.
#[derive( Debug, Error )]
pub enum PlaylistError {
    #[error( "{path}: {source}" )]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}


/// Writes `songs` to `path`, replacing any existing file.
///
/// @param base_dir - Directory relative songs were expanded against, or
///   `None` for the working directory
pub fn export( path: &Path, songs: &[PathBuf], base_dir: Option<&Path> ) -> Result<(), PlaylistError> {
    let io_err = |source| PlaylistError::Io { path: path.to_path_buf(), source };

    let file = File::create( path ).map_err( io_err )?;
    let mut writer = BufWriter::new( file );

    for song in songs {
        // Playlist lines resolve against the playlist's own directory
        let song = match base_dir {
            Some( base ) => base.join( song ),
            None => std::path::absolute( song ).map_err( io_err )?,
        };
        writeln!( writer, "{}", song.to_string_lossy() ).map_err( io_err )?;
    }
    writer.flush().map_err( io_err )?;

    tracing::info!( "Wrote {} songs to {:?}", songs.len(), path );
    Ok(())
}


#[cfg( test )]
mod tests {
    use super::*;

    use std::fs;

    use tempfile::TempDir;

    use crate::config::PlayerConfig;
    use crate::expand::PathExpander;


    #[test]
    fn test_export_one_absolute_path_per_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join( "out.m3u" );

        export( &path, &[ PathBuf::from( "a.mp3" ), PathBuf::from( "mix/b c.flac" ) ], Some( dir.path() ) ).unwrap();

        let expected = format!(
            "{}\n{}\n",
            dir.path().join( "a.mp3" ).display(),
            dir.path().join( "mix/b c.flac" ).display()
        );
        assert_eq!( fs::read_to_string( &path ).unwrap(), expected );
    }


    #[test]
    fn test_export_relative_songs_to_subdirectory() {
        let dir = TempDir::new().unwrap();
        let config = PlayerConfig::default();
        let expander = PathExpander::new( &config );
        fs::create_dir_all( dir.path().join( "music" ) ).unwrap();
        fs::create_dir_all( dir.path().join( "out" ) ).unwrap();
        fs::write( dir.path().join( "music/a.mp3" ), b"" ).unwrap();
        fs::write( dir.path().join( "music/b.mp3" ), b"" ).unwrap();

        // As queued from `mp music` run inside `dir`
        let songs = vec![ PathBuf::from( "music/a.mp3" ), PathBuf::from( "music/b.mp3" ) ];
        export( &dir.path().join( "out/list.m3u" ), &songs, Some( dir.path() ) ).unwrap();

        let reread = expander.expand( [ "out/list.m3u" ], Some( dir.path() ) ).unwrap();
        assert!( reread.skipped.is_empty() );
        assert_eq!( reread.songs, vec![ dir.path().join( "music/a.mp3" ), dir.path().join( "music/b.mp3" ) ] );
    }


    #[test]
    fn test_export_without_base_uses_working_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join( "out.m3u" );

        export( &path, &[ PathBuf::from( "a.mp3" ) ], None ).unwrap();

        let cwd = std::env::current_dir().unwrap();
        assert_eq!( fs::read_to_string( &path ).unwrap(), format!( "{}\n", cwd.join( "a.mp3" ).display() ) );
    }


    #[test]
    fn test_exported_playlist_expands_to_same_songs() {
        let dir = TempDir::new().unwrap();
        let songs = vec![ dir.path().join( "b.mp3" ), dir.path().join( "a.ogg" ) ];
        for song in &songs {
            fs::write( song, b"" ).unwrap();
        }
        let path = dir.path().join( "out.m3u" );

        export( &path, &songs, None ).unwrap();

        let config = PlayerConfig::default();
        let expansion = PathExpander::new( &config ).expand( [ path.to_string_lossy() ], None ).unwrap();
        assert_eq!( expansion.songs, songs );
    }


    #[test]
    fn test_export_to_missing_directory() {
        let dir = TempDir::new().unwrap();
        let result = export( &dir.path().join( "nope/out.m3u" ), &[], None );
        assert!( matches!( result, Err( PlaylistError::Io { .. } ) ) );
    }
}
