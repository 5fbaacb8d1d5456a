//! Audio decoding via Symphonia
//!
//! Handles decoding of various audio formats into raw PCM samples.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::{ AudioBufferRef, SampleBuffer };
use symphonia::core::codecs::{ Decoder as SymphoniaDecoder, DecoderOptions, CODEC_TYPE_NULL };
use symphonia::core::formats::{ FormatOptions, FormatReader };
use symphonia::core::io::{ MediaSourceStream, MediaSourceStreamOptions };
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;


/// Errors that can occur during decoding.
#[derive( Debug, Error )]
pub enum DecoderError {
    #[error( "Failed to open file: {0}" )]
    FileOpen( #[from] std::io::Error ),

    #[error( "Unsupported format" )]
    UnsupportedFormat,

    #[error( "No audio tracks found" )]
    NoAudioTrack,

    #[error( "Decoder creation failed: {0}" )]
    DecoderCreation( String ),

    #[error( "Decode error: {0}" )]
    Decode( String ),

    #[error( "Stream changed from {expected} to {found} channels" )]
    ChannelMismatch { expected: usize, found: usize },
}


/// Audio decoder wrapper around Symphonia.
pub struct Decoder {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn SymphoniaDecoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    interleaver: Interleaver,
}


impl Decoder {
    /// Opens an audio file for decoding.
    pub fn open( path: &Path ) -> Result<Self, DecoderError> {
        let file = File::open( path )?;
        let mss_opts = MediaSourceStreamOptions { buffer_len: 64 * 1024 };
        let mss = MediaSourceStream::new( Box::new( file ), mss_opts );

        // Provide hint based on file extension
        let mut hint = Hint::new();
        if let Some( ext ) = path.extension().and_then( |e| e.to_str() ) {
            hint.with_extension( ext );
        }

        let probed = symphonia::default::get_probe()
            .format( &hint, mss, &FormatOptions::default(), &MetadataOptions::default() )
            .map_err( |_| DecoderError::UnsupportedFormat )?;

        let format_reader = probed.format;

        // Find the first audio track
        let track = format_reader
            .tracks()
            .iter()
            .find( |t| t.codec_params.codec != CODEC_TYPE_NULL )
            .ok_or( DecoderError::NoAudioTrack )?;

        let track_id = track.id;
        let codec_params = &track.codec_params;

        let sample_rate = codec_params.sample_rate.unwrap_or( 44100 );
        let channels = codec_params.channels.map( |c| c.count() ).unwrap_or( 2 );

        tracing::info!(
            "Opened audio: {} Hz, {} channels, {:?} frames",
            sample_rate,
            channels,
            codec_params.n_frames
        );

        let decoder = symphonia::default::get_codecs()
            .make( codec_params, &DecoderOptions::default() )
            .map_err( |e| DecoderError::DecoderCreation( e.to_string() ) )?;

        Ok( Self {
            format_reader,
            decoder,
            track_id,
            sample_rate,
            channels,
            interleaver: Interleaver::new( channels ),
        })
    }


    /// Returns the sample rate of the audio.
    pub fn sample_rate( &self ) -> u32 {
        self.sample_rate
    }


    /// Returns the number of channels.
    pub fn channels( &self ) -> usize {
        self.channels
    }


    /// Decodes the next packet and returns interleaved f32 samples.
    ///
    /// Returns None when EOF is reached.
    pub fn decode_next( &mut self ) -> Result<Option<Vec<f32>>, DecoderError> {
        loop {
            let packet = match self.format_reader.next_packet() {
                Ok( packet ) => packet,
                Err( symphonia::core::errors::Error::IoError( ref e ) )
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok( None );
                }
                Err( e ) => {
                    return Err( DecoderError::Decode( e.to_string() ) );
                }
            };

            // Skip packets not for our track
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode( &packet ) {
                Ok( decoded ) => decoded,
                Err( symphonia::core::errors::Error::DecodeError( _ ) ) => {
                    // Decode errors are recoverable, skip this packet
                    continue;
                }
                Err( e ) => {
                    return Err( DecoderError::Decode( e.to_string() ) );
                }
            };

            return self.interleaver.copy( decoded ).map( Some );
        }
    }
}


/// Converts decoded packets to interleaved f32, reusing one buffer that
/// grows to fit the largest packet seen.
///
/// Packets must keep the channel count the stream was opened with, since
/// the output buffer and resampler are sized for it.
struct Interleaver {
    channels: usize,
    buf: Option<SampleBuffer<f32>>,
}


impl Interleaver {
    fn new( channels: usize ) -> Self {
        Self { channels, buf: None }
    }


    fn copy( &mut self, decoded: AudioBufferRef<'_> ) -> Result<Vec<f32>, DecoderError> {
        let spec = *decoded.spec();
        let found = spec.channels.count();
        if found != self.channels {
            return Err( DecoderError::ChannelMismatch { expected: self.channels, found } );
        }

        // Capacity is counted in samples, not frames
        let needed = decoded.frames() * found;
        let buf = match self.buf.take() {
            Some( buf ) if buf.capacity() >= needed => self.buf.insert( buf ),
            _ => self.buf.insert( SampleBuffer::new( decoded.frames() as u64, spec ) ),
        };
        buf.copy_interleaved_ref( decoded );

        Ok( buf.samples().to_vec() )
    }
}


#[cfg( test )]
mod tests {
    use super::*;

    use symphonia::core::audio::{ AsAudioBufferRef, AudioBuffer, Channels, Signal, SignalSpec };
    use tempfile::TempDir;


    fn packet( frames: usize, channels: Channels ) -> AudioBuffer<f32> {
        let mut buf = AudioBuffer::<f32>::new( frames as u64, SignalSpec::new( 44100, channels ) );
        buf.render_reserved( Some( frames ) );
        buf
    }


    fn stereo() -> Channels {
        Channels::FRONT_LEFT | Channels::FRONT_RIGHT
    }


    #[test]
    fn test_interleaver_grows_with_packet_size() {
        let mut interleaver = Interleaver::new( 2 );

        // Vorbis short and long blocks alternate within one stream
        for frames in [ 128, 576, 1024, 128, 1024 ] {
            let samples = interleaver.copy( packet( frames, stereo() ).as_audio_buffer_ref() ).unwrap();
            assert_eq!( samples.len(), frames * 2 );
        }
    }


    #[test]
    fn test_interleaver_rejects_channel_change() {
        let mut interleaver = Interleaver::new( 2 );

        let result = interleaver.copy( packet( 64, Channels::FRONT_LEFT ).as_audio_buffer_ref() );
        assert!( matches!( result, Err( DecoderError::ChannelMismatch { expected: 2, found: 1 } ) ) );
    }


    #[test]
    fn test_open_missing_file() {
        let result = Decoder::open( Path::new( "/definitely/not/here.flac" ) );
        assert!( matches!( result, Err( DecoderError::FileOpen( _ ) ) ) );
    }


    #[test]
    fn test_open_garbage_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join( "noise.ogg" );
        std::fs::write( &path, b"not an ogg stream at all" ).unwrap();

        assert!( matches!( Decoder::open( &path ), Err( DecoderError::UnsupportedFormat ) ) );
    }
}
