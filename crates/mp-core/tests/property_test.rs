//! Property-based tests for the session lists and the restart file.

use std::collections::HashSet;
use std::path::PathBuf;

use mp_core::config::RESTART_SEPARATOR;
use mp_core::{ RecordPolicy, RestartStore, SessionState };
use proptest::prelude::*;
use tempfile::TempDir;


fn song() -> impl Strategy<Value = PathBuf> {
    "[a-c]{1,2}/[a-e]{1,3}\\.(mp3|flac|ogg)".prop_map( PathBuf::from )
}


fn song_list() -> impl Strategy<Value = Vec<PathBuf>> {
    prop::collection::vec( song(), 0..30 )
}


proptest! {
    /// Property: already_played never repeats a song and keeps the skip list
    /// order, followed by new songs in the order they were played
    #[test]
    fn already_played_is_ordered_and_unique( skip in song_list(), played in song_list() ) {
        let mut session = SessionState::new( RecordPolicy::AfterPlay );
        session.set_skip( skip.clone() );
        for song in &played {
            session.record_played( song );
        }

        let result = session.already_played();

        let unique: HashSet<_> = result.iter().collect();
        prop_assert_eq!( unique.len(), result.len() );

        let mut expected = Vec::new();
        for song in skip.iter().chain( played.iter() ) {
            if !expected.contains( song ) {
                expected.push( song.clone() );
            }
        }
        prop_assert_eq!( result, expected );
    }


    /// Property: what is saved is exactly what is loaded back
    #[test]
    fn restart_file_round_trip(
        args in prop::collection::vec( "[a-zA-Z0-9 ._/~-]{0,24}", 1..8 ),
        played in song_list(),
    ) {
        let dir = TempDir::new().unwrap();
        let store = RestartStore::new( dir.path().join( ".mp-restart" ), RESTART_SEPARATOR );

        store.save( &args, &played ).unwrap();
        let record = store.load().unwrap();

        prop_assert_eq!( record.args, args );
        prop_assert_eq!( record.skip, played );
    }
}
