/// Cross-module wire codec tests: a full framed message from construction
/// through header parse, checksum verification, and payload decode.
use super::*;
use std::net::Ipv4Addr;

#[test]
fn full_version_message_round_trips_through_the_wire() {
    let fields = VersionFields {
        protocol_version: PROTOCOL_VERSION,
        services: 0,
        timestamp: 1_700_000_000,
        addr_recv: NetAddr::new(Ipv4Addr::new(203, 0, 113, 7), MAINNET_PORT, 0),
        addr_from: NetAddr::new(Ipv4Addr::new(0, 0, 0, 0), 0, 0),
        nonce: 0xDEAD_BEEF_CAFE_0001,
        user_agent: USER_AGENT.to_string(),
        start_height: 0,
        relay: false,
    };
    let payload = build_version_payload(&fields);
    let framed = build_message("version", &payload);

    let header = parse_header(&framed).unwrap();
    assert_eq!(header.magic, MAINNET_MAGIC);
    assert_eq!(header.command_str(), "version");
    assert_eq!(header.length as usize, payload.len());

    let body = &framed[HEADER_SIZE..HEADER_SIZE + header.length as usize];
    verify_checksum(body, header.checksum).unwrap();

    let parsed = parse_version_payload(body).unwrap();
    assert_eq!(parsed.nonce, fields.nonce);
    assert_eq!(parsed.user_agent, USER_AGENT);
}

#[test]
fn empty_payload_commands_frame_to_exactly_header_size() {
    for command in ["verack", "getaddr"] {
        let framed = build_message(command, &empty_payload());
        assert_eq!(framed.len(), HEADER_SIZE);
        let header = parse_header(&framed).unwrap();
        assert_eq!(header.checksum, EMPTY_PAYLOAD_CHECKSUM);
    }
}

#[test]
fn addr_message_frames_and_parses_back() {
    let mut first = NetAddr::new(Ipv4Addr::new(198, 51, 100, 23), MAINNET_PORT, 1);
    first.time = Some(1_700_000_001);
    let mut second = NetAddr::new(Ipv4Addr::new(192, 0, 2, 55), MAINNET_PORT, 1);
    second.time = Some(1_700_000_002);
    let peers = vec![first, second];
    let payload = build_addr_payload(&peers);
    let framed = build_message("addr", &payload);

    let header = parse_header(&framed).unwrap();
    let body = &framed[HEADER_SIZE..HEADER_SIZE + header.length as usize];
    verify_checksum(body, header.checksum).unwrap();

    let parsed = parse_addr_payload(body).unwrap();
    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed[0].ipv4(), peers[0].ipv4());
    assert_eq!(parsed[1].ipv4(), peers[1].ipv4());
}

#[test]
fn getdata_for_a_block_frames_with_correct_checksum() {
    let inv = vec![Inventory::block([0x42u8; 32])];
    let payload = build_getdata_payload(&inv);
    let framed = build_message("getdata", &payload);

    let header = parse_header(&framed).unwrap();
    assert_eq!(header.command_str(), "getdata");
    let body = &framed[HEADER_SIZE..HEADER_SIZE + header.length as usize];
    verify_checksum(body, header.checksum).unwrap();
    let parsed = parse_inv_payload(body).unwrap();
    assert_eq!(parsed, inv);
}

#[test]
fn a_truncated_frame_fails_header_parse_before_touching_the_payload() {
    let framed = build_message("ping", &build_ping_payload(7));
    let truncated = &framed[..HEADER_SIZE - 1];
    assert!(parse_header(truncated).is_err());
}

#[test]
fn tampered_payload_is_caught_by_checksum_not_by_the_frame_shape() {
    let mut framed = build_message("pong", &build_pong_payload(99));
    let last = framed.len() - 1;
    framed[last] ^= 0x01;
    let header = parse_header(&framed).unwrap();
    let body = &framed[HEADER_SIZE..HEADER_SIZE + header.length as usize];
    assert!(verify_checksum(body, header.checksum).is_err());
}
