//! Parallel decryption of a vote batch with an unbiased shuffle.
//!
//! A producer drains the input list in Fisher-Yates-with-pop order and
//! feeds a bounded channel. Worker threads decrypt, a collector gathers
//! the plaintexts in completion order. The producer's permutation is the
//! one that has to be uniform on its own; the workers only add noise on
//! top of it.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use tracing::debug;

use crate::cancel::CancelToken;
use crate::crypto::Crypto;
use crate::error::Error;
use crate::random::{random_index, SharedRandom};

/// Decrypt `votes` with `key`, returning the plaintexts in a uniformly
/// random order.
///
/// A ciphertext that cannot be decrypted is replaced by `error_value`, so
/// the output always has the same length as the input and a failing vote
/// cannot be located by position. With a seeded random source and
/// `workers == 1` the output order is reproducible.
pub fn decrypt_votes<C: Crypto + Sync>(
    crypto: &C,
    key: &[u8],
    mut votes: Vec<Vec<u8>>,
    workers: usize,
    random: &SharedRandom,
    error_value: &[u8],
    token: &CancelToken,
) -> Result<Vec<Vec<u8>>, Error> {
    let total = votes.len();
    let (vote_tx, vote_rx) = mpsc::sync_channel::<Vec<u8>>(1);
    let (out_tx, out_rx) = mpsc::sync_channel::<Vec<u8>>(1);
    let vote_rx = Arc::new(Mutex::new(vote_rx));

    thread::scope(|s| {
        // Pick a random remaining vote and hand it to the workers. The
        // swap-remove keeps every element selectable exactly once.
        let producer = s.spawn(move || -> Result<(), Error> {
            while !votes.is_empty() {
                token.check()?;
                let i = {
                    let mut rng = random.lock().unwrap();
                    random_index(&mut *rng, votes.len())
                };
                let vote = votes.swap_remove(i);
                if vote_tx.send(vote).is_err() {
                    // The collector went away; nothing left to feed.
                    break;
                }
            }
            Ok(())
        });

        for _ in 0..workers.max(1) {
            let vote_rx = Arc::clone(&vote_rx);
            let out_tx = out_tx.clone();
            s.spawn(move || loop {
                let vote = match vote_rx.lock().unwrap().recv() {
                    Ok(vote) => vote,
                    Err(_) => break,
                };
                let decrypted = match crypto.decrypt(key, &vote) {
                    Ok(plaintext) => plaintext,
                    Err(_) => {
                        debug!("replacing undecryptable vote with the error value");
                        error_value.to_vec()
                    }
                };
                if out_tx.send(decrypted).is_err() {
                    break;
                }
            });
        }
        // Workers hold the remaining senders; the output channel closes
        // once they are all done.
        drop(out_tx);

        let mut decrypted = Vec::with_capacity(total);
        loop {
            match out_rx.recv() {
                Ok(plaintext) => {
                    decrypted.push(plaintext);
                    if token.is_cancelled() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }

        // Unblocks any worker still sending (and through it the
        // producer) when the collect loop stopped early.
        drop(out_rx);

        producer
            .join()
            .unwrap_or(Err(Error::other("vote shuffler panicked")))?;
        token.check()?;
        Ok(decrypted)
    })
}
