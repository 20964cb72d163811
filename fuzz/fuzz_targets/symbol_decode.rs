#![no_main]

use fecshim::wire::{Pong, Symbol};
use libfuzzer_sys::fuzz_target;
use octs::Decode;

fuzz_target!(|data: &[u8]| {
    let mut cursor: &[u8] = data;
    let _ = Symbol::decode(&mut cursor);

    let mut cursor: &[u8] = data;
    let _ = Pong::decode(&mut cursor);
});
