//! Audio playback driver
//!
//! Plays one file at a time: Symphonia decodes, rubato resamples when the
//! device rate differs, and cpal drains the shared sample buffer.

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rubato::{ FastFixedOut, PolynomialDegree, Resampler };
use thiserror::Error;

use crate::decoder::Decoder;
use crate::output::{ AudioOutput, SampleBuffer };
use crate::playback::{ Interrupt, PlayOutcome, PlaybackDriver };


/// How long to sleep while the output buffer is full or draining.
const POLL_INTERVAL: Duration = Duration::from_millis( 5 );


/// Converts planar samples back to interleaved format.
/// [[L0, L1, ...], [R0, R1, ...]] → [L0, R0, L1, R1, ...]
fn interleave( channels: &[Vec<f32>] ) -> Vec<f32> {
    if channels.is_empty() || channels[ 0 ].is_empty() {
        return Vec::new();
    }
    let frames = channels[ 0 ].len();
    let num_ch = channels.len();
    let mut out = Vec::with_capacity( frames * num_ch );
    for f in 0..frames {
        for ch in channels {
            out.push( ch[ f ] );
        }
    }
    out
}


/// Errors that can occur during playback.
#[derive( Debug, Error )]
pub enum PlayerError {
    #[error( "Failed to open file: {0}" )]
    FileOpen( String ),

    #[error( "Decode error: {0}" )]
    Decode( String ),

    #[error( "Audio output error: {0}" )]
    Output( String ),
}


/// Plays files on the default output device.
#[derive( Debug, Default )]
pub struct AudioPlayer;


impl AudioPlayer {
    /// Creates a new player.
    pub fn new() -> Self {
        Self
    }
}


impl PlaybackDriver for AudioPlayer {
    fn play( &mut self, path: &Path, interrupt: &Interrupt ) -> Result<PlayOutcome, PlayerError> {
        tracing::info!( "Playing: {:?}", path );

        let decoder = Decoder::open( path )
            .map_err( |e| PlayerError::FileOpen( e.to_string() ) )?;

        let source_sample_rate = decoder.sample_rate();
        let channels = decoder.channels() as u16;

        // Create audio output - this also creates the sample buffer with proper channel config
        let ( output, sample_buffer ) = AudioOutput::new( source_sample_rate, channels )
            .map_err( |e| PlayerError::Output( e.to_string() ) )?;

        let target_sample_rate = output.sample_rate();

        output.play().map_err( |e| PlayerError::Output( e.to_string() ) )?;

        // Create resampler if sample rates don't match
        let resampler = if source_sample_rate != target_sample_rate {
            tracing::info!(
                "Resampling: {} Hz → {} Hz",
                source_sample_rate,
                target_sample_rate
            );

            // Use FastFixedOut which handles variable input sizes
            let resampler = FastFixedOut::<f32>::new(
                target_sample_rate as f64 / source_sample_rate as f64,
                2.0,  // max relative input/output size ratio
                PolynomialDegree::Cubic,
                1024, // output chunk size
                channels as usize,
            ).map_err( |e| PlayerError::Output( format!( "Failed to create resampler: {}", e ) ) )?;

            Some( resampler )
        } else {
            None
        };

        // The output stream stops when `output` is dropped on return
        let outcome = decode_loop( decoder, &sample_buffer, interrupt, resampler );
        drop( output );
        outcome
    }
}


/// Decodes into the sample buffer until end of stream or interrupt.
fn decode_loop(
    mut decoder: Decoder,
    sample_buffer: &Arc<SampleBuffer>,
    interrupt: &Interrupt,
    mut resampler: Option<FastFixedOut<f32>>,
) -> Result<PlayOutcome, PlayerError> {
    let channels = decoder.channels();

    // Input buffer for resampler (stores planar samples per channel)
    let mut resample_input: Vec<Vec<f32>> = ( 0..channels ).map( |_| Vec::new() ).collect();

    // Don't decode too far ahead - keep about 50ms buffered
    let target_buffer = ( decoder.sample_rate() as usize * channels ) / 20;

    loop {
        if interrupt.is_triggered() {
            tracing::debug!( "Decode loop: interrupt received" );
            sample_buffer.clear();
            return Ok( PlayOutcome::Interrupted );
        }

        if sample_buffer.len() > target_buffer {
            thread::sleep( POLL_INTERVAL );
            continue;
        }

        let samples = match decoder.decode_next() {
            Ok( Some( samples ) ) => samples,
            Ok( None ) => break,
            Err( e ) => return Err( PlayerError::Decode( e.to_string() ) ),
        };

        // Apply resampling if needed
        let output_samples = if let Some( ref mut resampler ) = resampler {
            // Add new samples to input buffer (convert interleaved to planar)
            for chunk in samples.chunks( channels ) {
                for ( ch_idx, sample ) in chunk.iter().enumerate() {
                    if ch_idx < resample_input.len() {
                        resample_input[ ch_idx ].push( *sample );
                    }
                }
            }

            // Process when we have enough input frames
            let mut output_interleaved = Vec::new();
            while resample_input[ 0 ].len() >= resampler.input_frames_next() {
                let needed = resampler.input_frames_next();

                let input_chunk: Vec<Vec<f32>> = resample_input
                    .iter_mut()
                    .map( |ch| ch.drain( ..needed ).collect() )
                    .collect();

                let resampled = resampler.process( &input_chunk, None )
                    .map_err( |e| PlayerError::Decode( format!( "Resample error: {}", e ) ) )?;
                output_interleaved.extend( interleave( &resampled ) );
            }

            output_interleaved
        } else {
            samples
        };

        if push_all( sample_buffer, &output_samples, interrupt ) {
            sample_buffer.clear();
            return Ok( PlayOutcome::Interrupted );
        }
    }

    // EOF - flush any remaining samples in resample buffer
    if let Some( ref mut resampler ) = resampler {
        if !resample_input[ 0 ].is_empty() {
            match resampler.process_partial( Some( &resample_input ), None ) {
                Ok( resampled ) => {
                    if push_all( sample_buffer, &interleave( &resampled ), interrupt ) {
                        sample_buffer.clear();
                        return Ok( PlayOutcome::Interrupted );
                    }
                }
                Err( e ) => tracing::error!( "Final resample error: {}", e ),
            }
        }
    }

    // Wait for the device to play what is buffered
    tracing::debug!( "Decode loop: reached end of file" );
    while !sample_buffer.is_empty() {
        if interrupt.is_triggered() {
            sample_buffer.clear();
            return Ok( PlayOutcome::Interrupted );
        }
        thread::sleep( POLL_INTERVAL );
    }

    Ok( PlayOutcome::Finished )
}


/// Pushes all samples, waiting for room. Returns true if interrupted first.
fn push_all( sample_buffer: &SampleBuffer, samples: &[f32], interrupt: &Interrupt ) -> bool {
    let mut offset = 0;
    while offset < samples.len() {
        if interrupt.is_triggered() {
            return true;
        }
        let pushed = sample_buffer.push( &samples[ offset.. ] );
        offset += pushed;
        if pushed == 0 {
            // Buffer full, wait a bit
            thread::sleep( POLL_INTERVAL );
        }
    }
    false
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_interleave() {
        let planar = vec![ vec![ 1.0, 2.0 ], vec![ 10.0, 20.0 ] ];
        assert_eq!( interleave( &planar ), vec![ 1.0, 10.0, 2.0, 20.0 ] );
        assert!( interleave( &[] ).is_empty() );
    }


    #[test]
    fn test_push_all_stops_when_interrupted() {
        let buffer = SampleBuffer::new( 4, 2, 2 );
        let interrupt = Interrupt::new();
        interrupt.trigger();

        assert!( push_all( &buffer, &[ 0.5; 16 ], &interrupt ) );
        assert!( buffer.is_empty() );
    }


    #[test]
    fn test_push_all_fills_buffer() {
        let buffer = SampleBuffer::new( 16, 2, 2 );
        assert!( !push_all( &buffer, &[ 0.5; 8 ], &Interrupt::new() ) );
        assert_eq!( buffer.len(), 8 );
    }


    #[test]
    fn test_missing_file_is_an_error() {
        let mut player = AudioPlayer::new();
        let result = player.play( Path::new( "/definitely/not/here.mp3" ), &Interrupt::new() );
        assert!( matches!( result, Err( PlayerError::FileOpen( _ ) ) ) );
    }
}
