#![no_main]

use fecshim::{decoder::Decoder, wire::SymbolHeader};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|ops: Vec<(SymbolHeader, Vec<u8>)>| {
    let mut decoder = Decoder::new();
    for (header, payload) in ops {
        let _ = decoder.receive(header, payload);
    }
});
