#![no_main]

use bytes::{Buf, BytesMut};
use mysql_harness::protocol::decode::{parse_command, parse_column_definition, parse_err, parse_ok};
use mysql_harness::protocol::decode_packet;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut buf = BytesMut::from(data);

    // Several packets may arrive in one TCP segment
    while !buf.is_empty() {
        match decode_packet(&buf) {
            Ok((packet, consumed)) => {
                if consumed == 0 {
                    break;
                }
                buf.advance(consumed);

                let _ = parse_command(&packet.payload);
                let _ = parse_column_definition(&packet.payload);
                if packet.is_ok() {
                    let _ = parse_ok(&packet.payload);
                }
                if packet.is_err() {
                    let _ = parse_err(&packet.payload);
                }
            }
            Err(_) => break,
        }
    }
});
