use proptest::prelude::*;

use tf_sniffer::proxy::FrameBuffer;

/// Split `stream` at the given cut points (taken modulo its length).
fn fragment(stream: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
    let mut points: Vec<usize> = cuts
        .iter()
        .map(|c| if stream.is_empty() { 0 } else { c % stream.len() })
        .collect();
    points.push(0);
    points.push(stream.len());
    points.sort_unstable();
    points.dedup();
    points.windows(2).map(|w| stream[w[0]..w[1]].to_vec()).collect()
}

fn stream_strategy() -> impl Strategy<Value = Vec<u8>> {
    // Bias towards NULs and the protocol's own characters.
    prop::collection::vec(
        prop_oneof![
            3 => Just(0u8),
            3 => Just(b'%'),
            10 => any::<u8>(),
        ],
        0..512,
    )
}

proptest! {
    #[test]
    fn fragmented_reads_match_whole_stream_split(
        stream in stream_strategy(),
        cuts in prop::collection::vec(any::<usize>(), 0..16),
    ) {
        let mut expected: Vec<Vec<u8>> = stream.split(|&b| b == 0).map(<[u8]>::to_vec).collect();
        let tail = expected.pop().unwrap_or_default();

        let mut frames = FrameBuffer::new();
        let mut packets = Vec::new();
        for chunk in fragment(&stream, &cuts) {
            packets.extend(frames.extend_and_split(&chunk).into_iter().map(|p| p.to_vec()));
        }

        prop_assert_eq!(packets, expected);
        prop_assert_eq!(frames.pending(), tail.as_slice());
    }

    #[test]
    fn byte_at_a_time_keeps_everything(stream in stream_strategy()) {
        let mut frames = FrameBuffer::new();
        let mut rebuilt = Vec::new();
        for byte in &stream {
            for packet in frames.extend_and_split(std::slice::from_ref(byte)) {
                rebuilt.extend_from_slice(&packet);
                rebuilt.push(0);
            }
        }
        rebuilt.extend_from_slice(frames.pending());
        prop_assert_eq!(rebuilt, stream);
    }
}

#[test]
fn partial_packet_waits_for_its_delimiter() {
    let mut frames = FrameBuffer::new();
    assert!(frames.extend_and_split(b"%xt%snap").is_empty());
    assert_eq!(frames.pending(), b"%xt%snap");
    let packets = frames.extend_and_split(b"Shot%\0%xt%");
    assert_eq!(packets.len(), 1);
    assert_eq!(&packets[0][..], b"%xt%snapShot%");
    assert_eq!(frames.pending(), b"%xt%");
}
