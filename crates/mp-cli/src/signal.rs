//! Termination signal handling
//!
//! A small tokio runtime on its own thread waits for termination signals.
//! The first one raises the player's [`Interrupt`]; the player notices the
//! flag between buffers, so the session is persisted before the process
//! exits. A second signal exits at once, for when playback is stuck.

use std::io;
use std::process;
use std::thread;

use mp_core::Interrupt;
use tokio::runtime::{ Builder, Runtime };


/// Installs the signal listener and returns the interrupt it raises.
pub fn install() -> io::Result<Interrupt> {
    let interrupt = Interrupt::new();
    let flag = interrupt.clone();

    let runtime = Builder::new_current_thread().enable_all().build()?;
    let mut listener = runtime.block_on( async { Listener::new() } )?;

    thread::Builder::new()
        .name( "mp-signals".to_string() )
        .spawn( move || wait( runtime, &mut listener, flag ) )?;

    Ok( interrupt )
}


/// Exit status after a second signal, as for a process killed by SIGINT.
const FORCED_EXIT_CODE: i32 = 130;


fn wait( runtime: Runtime, listener: &mut Listener, flag: Interrupt ) {
    loop {
        let name = runtime.block_on( listener.recv() );
        if !raise( &flag ) {
            tracing::warn!( "Received {} again, exiting without saving", name );
            process::exit( FORCED_EXIT_CODE );
        }
        tracing::info!( "Received {}, stopping", name );
    }
}


/// Raises the interrupt. Returns false if it was already raised.
fn raise( flag: &Interrupt ) -> bool {
    if flag.is_triggered() {
        return false;
    }
    flag.trigger();
    true
}


#[cfg( unix )]
struct Listener {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    hangup: tokio::signal::unix::Signal,
}


#[cfg( unix )]
impl Listener {
    fn new() -> io::Result<Self> {
        use tokio::signal::unix::{ signal, SignalKind };

        Ok( Self {
            interrupt: signal( SignalKind::interrupt() )?,
            terminate: signal( SignalKind::terminate() )?,
            hangup: signal( SignalKind::hangup() )?,
        })
    }


    async fn recv( &mut self ) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.hangup.recv() => "SIGHUP",
        }
    }
}


#[cfg( not( unix ) )]
struct Listener;


#[cfg( not( unix ) )]
impl Listener {
    fn new() -> io::Result<Self> {
        Ok( Self )
    }


    async fn recv( &mut self ) -> &'static str {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "Ctrl-C",
            Err( e ) => {
                tracing::warn!( "Cannot listen for Ctrl-C: {}", e );
                std::future::pending::<&'static str>().await
            }
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;

    use std::time::{ Duration, Instant };


    #[test]
    fn test_raise_only_once() {
        let flag = Interrupt::new();
        assert!( raise( &flag ) );
        assert!( flag.is_triggered() );
        assert!( !raise( &flag ) );
    }


    #[cfg( unix )]
    #[test]
    fn test_hangup_raises_interrupt() {
        let interrupt = install().unwrap();

        let status = std::process::Command::new( "kill" )
            .args( [ "-HUP", &process::id().to_string() ] )
            .status()
            .unwrap();
        assert!( status.success() );

        let deadline = Instant::now() + Duration::from_secs( 5 );
        while !interrupt.is_triggered() && Instant::now() < deadline {
            thread::sleep( Duration::from_millis( 10 ) );
        }
        assert!( interrupt.is_triggered() );
    }
}
