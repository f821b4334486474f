#![no_main]

use mysql_harness::protocol::decode::{is_ssl_request, parse_auth_switch, parse_handshake, parse_handshake_response};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = parse_handshake(data);
    let _ = parse_auth_switch(data);
    if !is_ssl_request(data) {
        let _ = parse_handshake_response(data);
    }
});
