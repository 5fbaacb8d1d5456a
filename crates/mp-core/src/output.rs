//! Audio output via cpal
//!
//! Handles sending decoded PCM samples to the system audio device.

use std::collections::VecDeque;
use std::sync::{ Arc, Mutex, MutexGuard, PoisonError };

use cpal::traits::{ DeviceTrait, HostTrait, StreamTrait };
use thiserror::Error;


/// Errors that can occur with audio output.
#[derive( Debug, Error )]
pub enum OutputError {
    #[error( "No output device available" )]
    NoDevice,

    #[error( "Failed to get default stream config: {0}" )]
    StreamConfig( String ),

    #[error( "Failed to build output stream: {0}" )]
    BuildStream( String ),

    #[error( "Failed to play stream: {0}" )]
    PlayStream( String ),
}


/// Shared sample buffer between producer (decoder) and consumer (audio callback).
/// Handles channel conversion between source and output.
pub struct SampleBuffer {
    buffer: Mutex<VecDeque<f32>>,
    capacity: usize,
    source_channels: usize,
    output_channels: usize,
}


impl SampleBuffer {
    /// Creates a new sample buffer with the given capacity and channel configuration.
    ///
    /// - `capacity`: Maximum number of samples to buffer
    /// - `source_channels`: Number of channels in the source audio (from decoder)
    /// - `output_channels`: Number of channels expected by the output device
    pub fn new( capacity: usize, source_channels: u16, output_channels: u16 ) -> Self {
        Self {
            buffer: Mutex::new( VecDeque::with_capacity( capacity ) ),
            capacity,
            source_channels: source_channels.max( 1 ) as usize,
            output_channels: output_channels.max( 1 ) as usize,
        }
    }


    // The audio callback must keep running even if a producer panicked
    fn lock( &self ) -> MutexGuard<'_, VecDeque<f32>> {
        self.buffer.lock().unwrap_or_else( PoisonError::into_inner )
    }


    /// Pushes samples to the buffer. Returns number of samples actually pushed.
    pub fn push( &self, samples: &[f32] ) -> usize {
        let mut buf = self.lock();
        let available = self.capacity.saturating_sub( buf.len() );
        let to_push = samples.len().min( available );
        buf.extend( samples[ ..to_push ].iter().copied() );
        to_push
    }


    /// Pops whole frames into `output`, converting channel layout, and fills
    /// the rest with silence. Returns the number of output samples written.
    pub fn pop( &self, output: &mut [f32] ) -> usize {
        let mut buf = self.lock();
        let src_ch = self.source_channels;
        let out_ch = self.output_channels;

        let frames = ( output.len() / out_ch ).min( buf.len() / src_ch );
        let written = frames * out_ch;

        let mut frame = Vec::with_capacity( src_ch );
        for out_frame in output[ ..written ].chunks_exact_mut( out_ch ) {
            frame.clear();
            frame.extend( buf.drain( ..src_ch ) );
            remix( &frame, out_frame );
        }

        output[ written.. ].fill( 0.0 );
        written
    }


    /// Returns the number of samples currently in the buffer.
    pub fn len( &self ) -> usize {
        self.lock().len()
    }


    /// Returns true if the buffer is empty.
    pub fn is_empty( &self ) -> bool {
        self.lock().is_empty()
    }


    /// Clears the buffer.
    pub fn clear( &self ) {
        self.lock().clear();
    }
}


/// Maps one source frame onto one output frame: equal layouts copy, mono
/// output averages, wider output repeats the last source channel.
fn remix( src: &[f32], out: &mut [f32] ) {
    if out.len() == 1 && src.len() > 1 {
        out[ 0 ] = src.iter().sum::<f32>() / src.len() as f32;
        return;
    }
    let last = src.len() - 1;
    for ( ch, sample ) in out.iter_mut().enumerate() {
        *sample = src[ ch.min( last ) ];
    }
}


/// Audio output handler.
/// Note: This struct is NOT Send/Sync due to cpal::Stream.
/// Keep it on the thread where it was created.
pub struct AudioOutput {
    stream: cpal::Stream,
    sample_rate: u32,
}


impl AudioOutput {
    /// Creates a new audio output with the specified source sample rate and channels.
    ///
    /// Returns both the AudioOutput and a shared SampleBuffer that the caller should
    /// use to push decoded samples. The buffer handles channel conversion if needed.
    pub fn new(
        source_sample_rate: u32,
        source_channels: u16,
    ) -> Result<( Self, Arc<SampleBuffer> ), OutputError> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or( OutputError::NoDevice )?;

        tracing::info!( "Using output device: {:?}", device.name() );

        // Priority: 1) exact match, 2) same sample rate any channels, 3) device default
        let supported_configs: Vec<_> = device
            .supported_output_configs()
            .map_err( |e| OutputError::StreamConfig( e.to_string() ) )?
            .collect();

        let supports_rate = |c: &cpal::SupportedStreamConfigRange| {
            c.min_sample_rate().0 <= source_sample_rate && c.max_sample_rate().0 >= source_sample_rate
        };

        let config = if let Some( supported ) = supported_configs.iter()
            .find( |c| c.channels() == source_channels && supports_rate( *c ) )
            .or_else( || supported_configs.iter().find( |c| supports_rate( *c ) ) )
        {
            supported.clone()
                .with_sample_rate( cpal::SampleRate( source_sample_rate ) )
                .config()
        } else {
            // Resampling in the player makes up for the rate difference
            let default_config = device
                .default_output_config()
                .map_err( |e| OutputError::StreamConfig( e.to_string() ) )?;
            tracing::info!(
                "Device does not support {} Hz, using {} Hz",
                source_sample_rate,
                default_config.sample_rate().0
            );
            default_config.config()
        };

        tracing::info!(
            "Audio output config: {} Hz, {} channels",
            config.sample_rate.0,
            config.channels
        );

        // Buffer size: ~500ms of audio at the device rate
        let buffer_capacity = ( config.sample_rate.0 as usize ) * ( source_channels.max( 1 ) as usize ) / 2;
        let sample_buffer = Arc::new( SampleBuffer::new(
            buffer_capacity,
            source_channels,
            config.channels,
        ));
        let sample_buffer_clone = Arc::clone( &sample_buffer );

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    sample_buffer_clone.pop( data );
                },
                |err| {
                    tracing::error!( "Audio output error: {}", err );
                },
                None,
            )
            .map_err( |e| OutputError::BuildStream( e.to_string() ) )?;

        Ok((
            Self {
                stream,
                sample_rate: config.sample_rate.0,
            },
            sample_buffer,
        ))
    }


    /// Starts audio output.
    pub fn play( &self ) -> Result<(), OutputError> {
        self.stream
            .play()
            .map_err( |e| OutputError::PlayStream( e.to_string() ) )
    }


    /// Gets the actual sample rate.
    pub fn sample_rate( &self ) -> u32 {
        self.sample_rate
    }

}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_push_respects_capacity() {
        let buffer = SampleBuffer::new( 4, 2, 2 );
        assert_eq!( buffer.push( &[ 0.1; 6 ] ), 4 );
        assert_eq!( buffer.push( &[ 0.1; 2 ] ), 0 );
        assert_eq!( buffer.len(), 4 );
    }


    #[test]
    fn test_pop_same_layout_pads_with_silence() {
        let buffer = SampleBuffer::new( 16, 2, 2 );
        buffer.push( &[ 1.0, 2.0, 3.0, 4.0 ] );

        let mut out = [ 9.0; 6 ];
        assert_eq!( buffer.pop( &mut out ), 4 );
        assert_eq!( out, [ 1.0, 2.0, 3.0, 4.0, 0.0, 0.0 ] );
        assert!( buffer.is_empty() );
    }


    #[test]
    fn test_pop_mono_to_stereo() {
        let buffer = SampleBuffer::new( 16, 1, 2 );
        buffer.push( &[ 0.25, 0.5 ] );

        let mut out = [ 0.0; 4 ];
        assert_eq!( buffer.pop( &mut out ), 4 );
        assert_eq!( out, [ 0.25, 0.25, 0.5, 0.5 ] );
    }


    #[test]
    fn test_pop_stereo_to_mono() {
        let buffer = SampleBuffer::new( 16, 2, 1 );
        buffer.push( &[ 0.2, 0.4, 1.0, 0.0 ] );

        let mut out = [ 0.0; 2 ];
        assert_eq!( buffer.pop( &mut out ), 2 );
        assert!( ( out[ 0 ] - 0.3 ).abs() < 1e-6 );
        assert!( ( out[ 1 ] - 0.5 ).abs() < 1e-6 );
    }


    #[test]
    fn test_pop_leaves_partial_frame() {
        let buffer = SampleBuffer::new( 16, 2, 2 );
        buffer.push( &[ 1.0, 2.0, 3.0 ] );

        let mut out = [ 0.0; 4 ];
        assert_eq!( buffer.pop( &mut out ), 2 );
        assert_eq!( buffer.len(), 1 );
    }


    #[test]
    fn test_clear() {
        let buffer = SampleBuffer::new( 16, 2, 2 );
        buffer.push( &[ 1.0; 8 ] );
        buffer.clear();
        assert!( buffer.is_empty() );
    }
}
