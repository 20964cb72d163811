#![no_main]

use fecshim::cipher::CipherEnvelope;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut envelope = CipherEnvelope::new(&[0x42; fecshim::SKEY_BYTES], true).unwrap();
    let _ = envelope.open(data);
});
