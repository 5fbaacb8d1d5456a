//! Restart file
//!
//! Persists the arguments of the last run and the songs it already played,
//! so that running without arguments picks up where the last run stopped.
//!
//! The file is plain text, one entry per line:
//!
//! ```text
//! <arg1>
//! ...
//! ### skip the following songs ###
//! <song1>
//! ...
//! ```

use std::fs::{ self, File };
use std::io::{ BufWriter, ErrorKind, Write };
use std::path::{ Path, PathBuf };

use thiserror::Error;

use crate::config::PlayerConfig;


/// Errors that can occur reading or writing the restart file.
#[derive( Debug, Error )]
pub enum RestartError {
    #[error( "{0}: not found" )]
    NotFound( PathBuf ),

    #[error( "{0}: missing separator line" )]
    MissingSeparator( PathBuf ),

    #[error( "{path}: {source}" )]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}


/// Contents of a restart file.
#[derive( Debug, Clone, Default, PartialEq, Eq )]
pub struct RestartRecord {
    /// Arguments the saved run was invoked with.
    pub args: Vec<String>,

    /// Songs already played, to be skipped when resuming.
    pub skip: Vec<PathBuf>,
}


/// Reads and writes the restart file.
#[derive( Debug, Clone )]
pub struct RestartStore {
    path: PathBuf,
    separator: String,
}


impl RestartStore {
    /// Creates a store for `path` using `separator` between the sections.
    pub fn new( path: impl Into<PathBuf>, separator: impl Into<String> ) -> Self {
        Self {
            path: path.into(),
            separator: separator.into(),
        }
    }


    /// Creates a store from the restart settings of a [`PlayerConfig`].
    pub fn from_config( config: &PlayerConfig ) -> Self {
        Self::new( config.restart_path.clone(), config.separator.clone() )
    }


    /// Gets the restart file path.
    pub fn path( &self ) -> &Path {
        &self.path
    }


    /// Overwrites the restart file.
    ///
    /// @param args - Arguments of the run being saved
    /// @param already_played - Songs to skip on resume, already deduplicated
    pub fn save<S: AsRef<str>>( &self, args: &[S], already_played: &[PathBuf] ) -> Result<(), RestartError> {
        let io_err = |source| RestartError::Io { path: self.path.clone(), source };

        let file = File::create( &self.path ).map_err( io_err )?;
        let mut writer = BufWriter::new( file );

        for arg in args {
            writeln!( writer, "{}", arg.as_ref() ).map_err( io_err )?;
        }
        writeln!( writer, "{}", self.separator ).map_err( io_err )?;
        for song in already_played {
            writeln!( writer, "{}", song.to_string_lossy() ).map_err( io_err )?;
        }
        writer.flush().map_err( io_err )?;

        tracing::info!(
            "Saved restart file {:?}: {} args, {} songs to skip",
            self.path,
            args.len(),
            already_played.len()
        );
        Ok(())
    }


    /// Loads the restart file.
    ///
    /// Everything before the first separator line is an argument, everything
    /// after it a song to skip. An empty skip section is valid.
    pub fn load( &self ) -> Result<RestartRecord, RestartError> {
        let contents = match fs::read_to_string( &self.path ) {
            Ok( c ) => c,
            Err( e ) if e.kind() == ErrorKind::NotFound => {
                return Err( RestartError::NotFound( self.path.clone() ) );
            }
            Err( source ) => {
                return Err( RestartError::Io { path: self.path.clone(), source } );
            }
        };

        let record = parse( &contents, &self.separator )
            .ok_or_else( || RestartError::MissingSeparator( self.path.clone() ) )?;

        tracing::info!(
            "Loaded restart file {:?}: {} args, {} songs to skip",
            self.path,
            record.args.len(),
            record.skip.len()
        );
        Ok( record )
    }
}


/// Splits restart file contents at the separator line.
fn parse( contents: &str, separator: &str ) -> Option<RestartRecord> {
    let mut lines = contents.lines();
    let mut args = Vec::new();

    loop {
        let line = lines.next()?;
        if line == separator {
            break;
        }
        args.push( line.to_string() );
    }

    let skip = lines.map( PathBuf::from ).collect();
    Some( RestartRecord { args, skip } )
}


#[cfg( test )]
mod tests {
    use super::*;

    use tempfile::TempDir;

    use crate::config::RESTART_SEPARATOR;


    fn store_in( dir: &TempDir ) -> RestartStore {
        RestartStore::new( dir.path().join( ".mp-restart" ), RESTART_SEPARATOR )
    }


    #[test]
    fn test_load_splits_at_separator() {
        let dir = TempDir::new().unwrap();
        let store = store_in( &dir );
        fs::write( store.path(), "x.mp3\ny.mp3\n### skip the following songs ###\nx.mp3" ).unwrap();

        let record = store.load().unwrap();

        assert_eq!( record.args, vec![ "x.mp3", "y.mp3" ] );
        assert_eq!( record.skip, vec![ PathBuf::from( "x.mp3" ) ] );
    }


    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = store_in( &dir );
        let args = [ "-r", "music", "mix/list.m3u" ];
        let played = vec![ PathBuf::from( "music/b.ogg" ), PathBuf::from( "music/a song.flac" ) ];

        store.save( &args, &played ).unwrap();
        let record = store.load().unwrap();

        assert_eq!( record.args, args );
        assert_eq!( record.skip, played );
    }


    #[test]
    fn test_empty_skip_section() {
        let dir = TempDir::new().unwrap();
        let store = store_in( &dir );

        store.save( &[ "a.mp3" ], &[] ).unwrap();

        let contents = fs::read_to_string( store.path() ).unwrap();
        assert_eq!( contents, "a.mp3\n### skip the following songs ###\n" );
        assert_eq!( store.load().unwrap(), RestartRecord {
            args: vec![ "a.mp3".to_string() ],
            skip: Vec::new(),
        });
    }


    #[test]
    fn test_save_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = store_in( &dir );

        store.save( &[ "old.mp3" ], &[ PathBuf::from( "old.mp3" ) ] ).unwrap();
        store.save( &[ "new.mp3" ], &[] ).unwrap();

        let record = store.load().unwrap();
        assert_eq!( record.args, vec![ "new.mp3" ] );
        assert!( record.skip.is_empty() );
    }


    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = store_in( &dir ).load();
        assert!( matches!( result, Err( RestartError::NotFound( _ ) ) ) );
    }


    #[test]
    fn test_missing_separator() {
        let dir = TempDir::new().unwrap();
        let store = store_in( &dir );
        fs::write( store.path(), "x.mp3\ny.mp3\n" ).unwrap();

        assert!( matches!( store.load(), Err( RestartError::MissingSeparator( _ ) ) ) );
    }


    #[test]
    fn test_separator_must_match_whole_line() {
        let dir = TempDir::new().unwrap();
        let store = store_in( &dir );
        fs::write( store.path(), "x.mp3\n  ### skip the following songs ###\n" ).unwrap();

        assert!( matches!( store.load(), Err( RestartError::MissingSeparator( _ ) ) ) );
    }


    #[test]
    fn test_unwritable_location() {
        let dir = TempDir::new().unwrap();
        let store = RestartStore::new( dir.path().join( "missing/dir/.mp-restart" ), RESTART_SEPARATOR );

        assert!( matches!( store.save( &[ "a.mp3" ], &[] ), Err( RestartError::Io { .. } ) ) );
    }
}
