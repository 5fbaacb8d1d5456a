//! Song metadata
//!
//! Reads artist/album/title tags through a prioritized list of extractors
//! and renders the one-line summary shown while a song plays.

use std::fs::{ self, File };
use std::path::{ Path, PathBuf };

use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{ MetadataOptions, StandardTagKey, Tag };
use symphonia::core::probe::{ Hint, ProbeResult };
use thiserror::Error;

use crate::config::PlayerConfig;


/// Errors that can occur reading tags or publishing the current song.
#[derive( Debug, Error )]
pub enum MetadataError {
    #[error( "Failed to open file: {0}" )]
    FileOpen( #[from] std::io::Error ),

    #[error( "Unsupported format" )]
    UnsupportedFormat,

    #[error( "{path}: cannot write now playing: {source}" )]
    NowPlaying {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}


/// Tags of interest for display. Values are kept as written in the file.
#[derive( Debug, Clone, Default, PartialEq, Eq )]
pub struct SongMetadata {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub title: Option<String>,
    pub track: Option<String>,
    pub disc: Option<String>,
}


impl SongMetadata {
    /// Collects the first value of each tag of interest.
    pub fn from_tags( tags: &[Tag] ) -> Self {
        let mut meta = Self::default();

        for tag in tags {
            let Some( std_key ) = tag.std_key else { continue };
            let slot = match std_key {
                StandardTagKey::Artist => &mut meta.artist,
                StandardTagKey::Album => &mut meta.album,
                StandardTagKey::TrackTitle => &mut meta.title,
                StandardTagKey::TrackNumber => &mut meta.track,
                StandardTagKey::DiscNumber => &mut meta.disc,
                _ => continue,
            };
            if slot.is_none() {
                let value = tag.value.to_string();
                let value = value.trim();
                if !value.is_empty() {
                    *slot = Some( value.to_string() );
                }
            }
        }

        meta
    }


    /// Returns true if no tag was found.
    pub fn is_empty( &self ) -> bool {
        self.artist.is_none()
            && self.album.is_none()
            && self.title.is_none()
            && self.track.is_none()
            && self.disc.is_none()
    }


    /// Renders `artist 'title' (track N from 'album')`, dropping the parts
    /// that are missing or switched off. Falls back to the path when there
    /// is no title.
    pub fn summary( &self, path: &Path, show_album: bool, show_track: bool ) -> String {
        let album = match ( show_album, &self.album ) {
            ( true, Some( album ) ) => match ( show_track, &self.disc, &self.track ) {
                ( true, Some( disc ), Some( track ) ) => {
                    format!( " (track {}.{} from '{}')", disc, track, album )
                }
                ( true, None, Some( track ) ) => {
                    format!( " (track {} from '{}')", track.trim_start_matches( '0' ), album )
                }
                _ => format!( " (from '{}')", album ),
            },
            _ => String::new(),
        };

        match ( &self.artist, &self.title ) {
            ( Some( artist ), Some( title ) ) => format!( "{} '{}'{}", artist, title, album ),
            ( None, Some( title ) ) => format!( "'{}'{}", title, album ),
            _ => path.display().to_string(),
        }
    }


    /// Text for the now playing file: `artist - title`.
    pub fn now_playing( &self ) -> String {
        [ &self.artist, &self.title ]
            .into_iter()
            .flatten()
            .map( String::as_str )
            .collect::<Vec<_>>()
            .join( " - " )
    }
}


/// A source of song metadata.
///
/// Extractors are tried in order; the first one that supports a file and
/// finds tags wins.
pub trait TagExtractor {
    /// Short name used in logs.
    fn name( &self ) -> &'static str;

    /// Returns true if this extractor can handle the file at all.
    fn supports( &self, path: &Path ) -> bool;

    /// Reads tags, returning `Ok( None )` when the file has none.
    fn extract( &self, path: &Path ) -> Result<Option<SongMetadata>, MetadataError>;
}


/// Tags found by the format probe ahead of the stream (ID3v2, APE).
pub struct LeadingTagExtractor;


impl TagExtractor for LeadingTagExtractor {
    fn name( &self ) -> &'static str {
        "leading tags"
    }


    fn supports( &self, _path: &Path ) -> bool {
        true
    }


    fn extract( &self, path: &Path ) -> Result<Option<SongMetadata>, MetadataError> {
        let mut probed = probe( path )?;

        let meta = probed.metadata
            .get()
            .and_then( |log| log.current().map( |rev| SongMetadata::from_tags( rev.tags() ) ) );

        Ok( meta.filter( |m| !m.is_empty() ) )
    }
}


/// Tags stored inside the container (Vorbis comments, MP4 atoms, RIFF INFO).
pub struct ContainerTagExtractor {
    extensions: Vec<String>,
}


impl ContainerTagExtractor {
    /// Creates an extractor for the given container extensions.
    pub fn new( extensions: &[&str] ) -> Self {
        Self {
            extensions: extensions.iter().map( |e| e.to_string() ).collect(),
        }
    }
}


impl Default for ContainerTagExtractor {
    fn default() -> Self {
        Self::new( &[ "flac", "ogg", "oga", "opus", "m4a", "m4b", "mp4", "wav" ] )
    }
}


impl TagExtractor for ContainerTagExtractor {
    fn name( &self ) -> &'static str {
        "container tags"
    }


    fn supports( &self, path: &Path ) -> bool {
        path.extension()
            .and_then( |e| e.to_str() )
            .map( |e| self.extensions.iter().any( |x| x.eq_ignore_ascii_case( e ) ) )
            .unwrap_or( false )
    }


    fn extract( &self, path: &Path ) -> Result<Option<SongMetadata>, MetadataError> {
        let mut probed = probe( path )?;

        let meta = probed.format
            .metadata()
            .current()
            .map( |rev| SongMetadata::from_tags( rev.tags() ) );

        Ok( meta.filter( |m| !m.is_empty() ) )
    }
}


fn probe( path: &Path ) -> Result<ProbeResult, MetadataError> {
    let file = File::open( path )?;
    let mss = MediaSourceStream::new( Box::new( file ), Default::default() );

    let mut hint = Hint::new();
    if let Some( ext ) = path.extension().and_then( |e| e.to_str() ) {
        hint.with_extension( ext );
    }

    symphonia::default::get_probe()
        .format( &hint, mss, &FormatOptions::default(), &MetadataOptions::default() )
        .map_err( |_| MetadataError::UnsupportedFormat )
}


/// Reads metadata through the configured extractors.
pub struct MetadataReader {
    extractors: Vec<Box<dyn TagExtractor>>,
    show_album: bool,
    show_track: bool,
}


impl MetadataReader {
    /// Creates a reader with the default extractors: leading tags first,
    /// then container tags.
    pub fn new( config: &PlayerConfig ) -> Self {
        Self::with_extractors(
            config,
            vec![
                Box::new( LeadingTagExtractor ),
                Box::new( ContainerTagExtractor::default() ),
            ],
        )
    }


    /// Creates a reader with an explicit extractor list, highest priority first.
    pub fn with_extractors( config: &PlayerConfig, extractors: Vec<Box<dyn TagExtractor>> ) -> Self {
        Self {
            extractors,
            show_album: config.show_album,
            show_track: config.show_track,
        }
    }


    /// Reads metadata, or `None` when no extractor found any.
    pub fn read( &self, path: &Path ) -> Option<SongMetadata> {
        for extractor in self.extractors.iter().filter( |e| e.supports( path ) ) {
            match extractor.extract( path ) {
                Ok( Some( meta ) ) => {
                    tracing::debug!( "Metadata for {:?} from {}", path, extractor.name() );
                    return Some( meta );
                }
                Ok( None ) => {}
                Err( e ) => {
                    tracing::debug!( "{} failed for {:?}: {}", extractor.name(), path, e );
                }
            }
        }
        None
    }


    /// Display summary for already-read metadata.
    pub fn summary_of( &self, path: &Path, meta: Option<&SongMetadata> ) -> String {
        match meta {
            Some( meta ) => meta.summary( path, self.show_album, self.show_track ),
            None => path.display().to_string(),
        }
    }


    /// Reads the file and returns its display summary.
    pub fn summarize( &self, path: &Path ) -> String {
        self.summary_of( path, self.read( path ).as_ref() )
    }


    /// Reads the file and writes `artist - title` to `target`.
    pub fn publish_now_playing( &self, path: &Path, target: &Path ) -> Result<(), MetadataError> {
        write_now_playing( target, self.read( path ).as_ref() )
    }
}


/// Writes `artist - title` (empty when unknown) to `target`.
pub fn write_now_playing( target: &Path, meta: Option<&SongMetadata> ) -> Result<(), MetadataError> {
    let text = meta.map( SongMetadata::now_playing ).unwrap_or_default();
    fs::write( target, text ).map_err( |source| MetadataError::NowPlaying {
        path: target.to_path_buf(),
        source,
    })
}


#[cfg( test )]
mod tests {
    use super::*;

    use tempfile::TempDir;


    fn tagged() -> SongMetadata {
        SongMetadata {
            artist: Some( "Nina Simone".into() ),
            album: Some( "Pastel Blues".into() ),
            title: Some( "Sinnerman".into() ),
            track: Some( "09".into() ),
            disc: None,
        }
    }


    #[test]
    fn test_summary_with_track() {
        let meta = tagged();
        assert_eq!(
            meta.summary( Path::new( "x.mp3" ), true, true ),
            "Nina Simone 'Sinnerman' (track 9 from 'Pastel Blues')"
        );
    }


    #[test]
    fn test_summary_with_disc_and_track() {
        let meta = SongMetadata { disc: Some( "2".into() ), ..tagged() };
        assert_eq!(
            meta.summary( Path::new( "x.mp3" ), true, true ),
            "Nina Simone 'Sinnerman' (track 2.09 from 'Pastel Blues')"
        );
    }


    #[test]
    fn test_summary_track_hidden() {
        assert_eq!(
            tagged().summary( Path::new( "x.mp3" ), true, false ),
            "Nina Simone 'Sinnerman' (from 'Pastel Blues')"
        );
    }


    #[test]
    fn test_summary_album_hidden() {
        assert_eq!( tagged().summary( Path::new( "x.mp3" ), false, true ), "Nina Simone 'Sinnerman'" );
    }


    #[test]
    fn test_summary_title_only() {
        let meta = SongMetadata { title: Some( "Intro".into() ), ..SongMetadata::default() };
        assert_eq!( meta.summary( Path::new( "x.mp3" ), true, true ), "'Intro'" );
    }


    #[test]
    fn test_summary_without_title_uses_path() {
        let meta = SongMetadata { artist: Some( "Someone".into() ), ..SongMetadata::default() };
        assert_eq!( meta.summary( Path::new( "music/x.mp3" ), true, true ), "music/x.mp3" );
    }


    #[test]
    fn test_now_playing_text() {
        assert_eq!( tagged().now_playing(), "Nina Simone - Sinnerman" );
        let title_only = SongMetadata { title: Some( "Intro".into() ), ..SongMetadata::default() };
        assert_eq!( title_only.now_playing(), "Intro" );
        assert_eq!( SongMetadata::default().now_playing(), "" );
    }


    struct Fixed {
        supported: bool,
        result: Option<SongMetadata>,
    }


    impl TagExtractor for Fixed {
        fn name( &self ) -> &'static str {
            "fixed"
        }

        fn supports( &self, _path: &Path ) -> bool {
            self.supported
        }

        fn extract( &self, _path: &Path ) -> Result<Option<SongMetadata>, MetadataError> {
            Ok( self.result.clone() )
        }
    }


    struct Failing;


    impl TagExtractor for Failing {
        fn name( &self ) -> &'static str {
            "failing"
        }

        fn supports( &self, _path: &Path ) -> bool {
            true
        }

        fn extract( &self, _path: &Path ) -> Result<Option<SongMetadata>, MetadataError> {
            Err( MetadataError::UnsupportedFormat )
        }
    }


    #[test]
    fn test_reader_uses_first_supporting_extractor_with_tags() {
        let other = SongMetadata { title: Some( "Other".into() ), ..SongMetadata::default() };
        let reader = MetadataReader::with_extractors( &PlayerConfig::default(), vec![
            Box::new( Fixed { supported: false, result: Some( other.clone() ) } ),
            Box::new( Failing ),
            Box::new( Fixed { supported: true, result: None } ),
            Box::new( Fixed { supported: true, result: Some( tagged() ) } ),
            Box::new( Fixed { supported: true, result: Some( other ) } ),
        ]);

        assert_eq!( reader.read( Path::new( "x.mp3" ) ), Some( tagged() ) );
    }


    #[test]
    fn test_reader_degrades_to_path() {
        let reader = MetadataReader::with_extractors( &PlayerConfig::default(), vec![ Box::new( Failing ) ] );
        assert_eq!( reader.summarize( Path::new( "music/x.mp3" ) ), "music/x.mp3" );
    }


    #[test]
    fn test_default_reader_on_garbage_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join( "noise.mp3" );
        fs::write( &path, b"definitely not audio" ).unwrap();

        let reader = MetadataReader::new( &PlayerConfig::default() );
        assert_eq!( reader.read( &path ), None );
        assert_eq!( reader.summarize( &path ), path.display().to_string() );
    }


    #[test]
    fn test_publish_now_playing() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join( ".nowplaying" );

        write_now_playing( &target, Some( &tagged() ) ).unwrap();
        assert_eq!( fs::read_to_string( &target ).unwrap(), "Nina Simone - Sinnerman" );

        let reader = MetadataReader::with_extractors( &PlayerConfig::default(), Vec::new() );
        reader.publish_now_playing( Path::new( "x.mp3" ), &target ).unwrap();
        assert_eq!( fs::read_to_string( &target ).unwrap(), "" );
    }


    #[test]
    fn test_publish_now_playing_failure() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join( "missing/.nowplaying" );

        let result = write_now_playing( &target, Some( &tagged() ) );
        assert!( matches!( result, Err( MetadataError::NowPlaying { .. } ) ) );
    }


    #[test]
    fn test_container_extractor_capability() {
        let extractor = ContainerTagExtractor::default();
        assert!( extractor.supports( Path::new( "a.FLAC" ) ) );
        assert!( extractor.supports( Path::new( "a.ogg" ) ) );
        assert!( !extractor.supports( Path::new( "a.mp3" ) ) );
    }
}
