//! EBML containers (webm, mkv).
//!
//! Reads the segment `Info` and `Tracks` elements and counts the blocks of the
//! first video track in each `Cluster`. The cluster scan stops as soon as the
//! duration, the track and at least one frame are known.

use super::{check_info, ContainerError, ContainerInfo, ContainerResult, ScanProgress};
use std::collections::HashMap;

const ID_EBML: u32 = 0x1A45_DFA3;
const ID_DOC_TYPE: u32 = 0x4282;
const ID_SEGMENT: u32 = 0x1853_8067;

const ID_SEEK_HEAD: u32 = 0x114D_9B74;
const ID_INFO: u32 = 0x1549_A966;
const ID_TRACKS: u32 = 0x1654_AE6B;
const ID_CLUSTER: u32 = 0x1F43_B675;
const ID_CUES: u32 = 0x1C53_BB6B;
const ID_TAGS: u32 = 0x1254_C367;
const ID_CHAPTERS: u32 = 0x1043_A770;
const ID_ATTACHMENTS: u32 = 0x1941_A469;

const ID_TIMECODE_SCALE: u32 = 0x2A_D7B1;
const ID_DURATION: u32 = 0x4489;

const ID_TRACK_ENTRY: u32 = 0xAE;
const ID_TRACK_NUMBER: u32 = 0xD7;
const ID_TRACK_TYPE: u32 = 0x83;
const ID_CODEC_ID: u32 = 0x86;
const ID_DEFAULT_DURATION: u32 = 0x23_E383;
const ID_VIDEO: u32 = 0xE0;
const ID_PIXEL_WIDTH: u32 = 0xB0;
const ID_PIXEL_HEIGHT: u32 = 0xBA;

const ID_CLUSTER_TIMECODE: u32 = 0xE7;
const ID_SIMPLE_BLOCK: u32 = 0xA3;
const ID_BLOCK_GROUP: u32 = 0xA0;
const ID_BLOCK: u32 = 0xA1;

const TRACK_TYPE_VIDEO: u64 = 1;
const DEFAULT_TIMECODE_SCALE: u64 = 1_000_000;
const NANOS_PER_SECOND: f64 = 1_000_000_000.0;

fn is_top_level(id: u32) -> bool {
    matches!(
        id,
        ID_SEEK_HEAD
            | ID_INFO
            | ID_TRACKS
            | ID_CLUSTER
            | ID_CUES
            | ID_TAGS
            | ID_CHAPTERS
            | ID_ATTACHMENTS
    )
}

#[derive(Debug, Clone, Copy)]
struct Element {
    id: u32,
    data_start: usize,
    end: usize,
    unknown_size: bool,
}

/// Read a variable-length integer. IDs keep their length marker; sizes do not.
fn read_vint(
    data: &[u8],
    pos: usize,
    limit: usize,
    max_len: u32,
    keep_marker: bool,
) -> ContainerResult<(u64, usize, bool)> {
    if pos >= limit {
        return Err(ContainerError::Truncated {
            offset: pos as u64,
        });
    }
    let first = data[pos];
    if first == 0 {
        return Err(ContainerError::invalid(format!(
            "invalid EBML integer at offset {}",
            pos
        )));
    }
    let len = first.leading_zeros() + 1;
    if len > max_len {
        return Err(ContainerError::invalid(format!(
            "EBML integer at offset {} is {} bytes long",
            pos, len
        )));
    }
    let len = len as usize;
    if pos + len > limit {
        return Err(ContainerError::Truncated {
            offset: limit as u64,
        });
    }

    let mut value = if keep_marker {
        first as u64
    } else {
        (first & (0xFF >> len)) as u64
    };
    for byte in &data[pos + 1..pos + len] {
        value = (value << 8) | *byte as u64;
    }
    let all_ones = !keep_marker && value == (1u64 << (7 * len)) - 1;
    Ok((value, len, all_ones))
}

fn read_id(data: &[u8], pos: usize, limit: usize) -> ContainerResult<(u32, usize)> {
    let (id, len, _) = read_vint(data, pos, limit, 4, true)?;
    Ok((id as u32, len))
}

fn read_element(data: &[u8], pos: usize, limit: usize) -> ContainerResult<Element> {
    let (id, id_len) = read_id(data, pos, limit)?;
    let (size, size_len, unknown_size) = read_vint(data, pos + id_len, limit, 8, false)?;
    let data_start = pos + id_len + size_len;

    let end = if unknown_size {
        limit
    } else {
        (data_start as u64)
            .checked_add(size)
            .filter(|end| *end <= limit as u64)
            .ok_or(ContainerError::Truncated {
                offset: limit as u64,
            })? as usize
    };

    Ok(Element {
        id,
        data_start,
        end,
        unknown_size,
    })
}

fn read_uint(data: &[u8], el: &Element) -> ContainerResult<u64> {
    let bytes = &data[el.data_start..el.end];
    if bytes.len() > 8 {
        return Err(ContainerError::invalid(format!(
            "unsigned integer element {:#x} is {} bytes long",
            el.id,
            bytes.len()
        )));
    }
    Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64))
}

fn read_float(data: &[u8], el: &Element) -> ContainerResult<f64> {
    let bytes = &data[el.data_start..el.end];
    match bytes.len() {
        0 => Ok(0.0),
        4 => Ok(f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64),
        8 => {
            let mut arr = [0u8; 8];
            arr.copy_from_slice(bytes);
            Ok(f64::from_be_bytes(arr))
        }
        n => Err(ContainerError::invalid(format!(
            "float element {:#x} is {} bytes long",
            el.id, n
        ))),
    }
}

fn read_string(data: &[u8], el: &Element) -> String {
    String::from_utf8_lossy(&data[el.data_start..el.end])
        .trim_end_matches('\0')
        .to_string()
}

/// Visit the children of a known-size element
fn for_each_child<F>(data: &[u8], parent: &Element, mut visit: F) -> ContainerResult<()>
where
    F: FnMut(&Element) -> ContainerResult<()>,
{
    let mut pos = parent.data_start;
    while pos < parent.end {
        let child = read_element(data, pos, parent.end)?;
        visit(&child)?;
        pos = child.end;
    }
    Ok(())
}

/// Short codec name from a Matroska CodecID
fn codec_name(codec_id: &str) -> String {
    match codec_id {
        "V_VP8" => "vp8".to_string(),
        "V_VP9" => "vp9".to_string(),
        "V_AV1" => "av1".to_string(),
        "V_MPEG4/ISO/AVC" => "h264".to_string(),
        "V_MPEGH/ISO/HEVC" => "hevc".to_string(),
        other => other.trim_start_matches("V_").to_lowercase(),
    }
}

#[derive(Debug, Default)]
struct VideoTrack {
    number: u64,
    codec_id: String,
    width: u64,
    height: u64,
    default_duration_ns: Option<u64>,
}

#[derive(Debug, Default, Clone, Copy)]
struct BlockStats {
    count: u64,
    max_timestamp: i64,
}

#[derive(Debug)]
struct SegmentState {
    timecode_scale: u64,
    duration_ticks: Option<f64>,
    video: Option<VideoTrack>,
    blocks: HashMap<u64, BlockStats>,
    stopped_early: bool,
}

impl Default for SegmentState {
    fn default() -> Self {
        Self {
            timecode_scale: DEFAULT_TIMECODE_SCALE,
            duration_ticks: None,
            video: None,
            blocks: HashMap::new(),
            stopped_early: false,
        }
    }
}

impl SegmentState {
    fn video_blocks(&self) -> Option<BlockStats> {
        let track = self.video.as_ref()?;
        self.blocks.get(&track.number).copied()
    }

    fn has_everything(&self) -> bool {
        self.duration_ticks.is_some() && self.video_blocks().is_some_and(|b| b.count > 0)
    }
}

pub fn parse(data: &[u8], progress: &mut ScanProgress) -> ContainerResult<ContainerInfo> {
    progress.advance_to(0)?;

    let header = read_element(data, 0, data.len())?;
    if header.id != ID_EBML {
        return Err(ContainerError::invalid("missing EBML header"));
    }
    let mut doc_type = None;
    for_each_child(data, &header, |child| {
        if child.id == ID_DOC_TYPE {
            doc_type = Some(read_string(data, child));
        }
        Ok(())
    })?;
    match doc_type.as_deref() {
        Some("webm") | Some("matroska") => {}
        Some(other) => {
            return Err(ContainerError::invalid(format!(
                "unsupported DocType '{}'",
                other
            )))
        }
        None => return Err(ContainerError::invalid("EBML header has no DocType")),
    }
    progress.advance_to(header.end as u64)?;

    let mut pos = header.end;
    let mut state = None;
    while pos < data.len() {
        let el = read_element(data, pos, data.len())?;
        if el.id == ID_SEGMENT {
            state = Some(parse_segment(data, &el, progress)?);
            break;
        }
        progress.advance_to(el.end as u64)?;
        pos = el.end;
    }
    let state = state.ok_or_else(|| ContainerError::invalid("missing Segment"))?;

    let track = state
        .video
        .as_ref()
        .ok_or_else(|| ContainerError::invalid("no video track"))?;
    let blocks = state.video_blocks().unwrap_or_default();
    let scale = state.timecode_scale as f64;

    let duration_seconds = match state.duration_ticks {
        Some(ticks) => ticks * scale / NANOS_PER_SECOND,
        None if blocks.count > 0 => {
            let frame_ticks = track
                .default_duration_ns
                .map(|ns| ns as f64 / scale)
                .unwrap_or(0.0);
            (blocks.max_timestamp as f64 + frame_ticks) * scale / NANOS_PER_SECOND
        }
        None => 0.0,
    };

    let frame_count = (!state.stopped_early).then_some(blocks.count);
    let framerate = match (track.default_duration_ns, frame_count) {
        (Some(ns), _) if ns > 0 => Some((NANOS_PER_SECOND / ns as f64) as f32),
        (_, Some(count)) if count > 0 && duration_seconds > 0.0 => {
            Some((count as f64 / duration_seconds) as f32)
        }
        _ => None,
    };

    let info = ContainerInfo {
        duration_seconds,
        width: u32::try_from(track.width).unwrap_or(0),
        height: u32::try_from(track.height).unwrap_or(0),
        codec: codec_name(&track.codec_id),
        frame_count,
        framerate,
    };
    check_info(&info)?;
    Ok(info)
}

fn parse_segment(
    data: &[u8],
    segment: &Element,
    progress: &mut ScanProgress,
) -> ContainerResult<SegmentState> {
    let mut state = SegmentState::default();
    let mut pos = segment.data_start;

    while pos < segment.end {
        let el = read_element(data, pos, segment.end)?;
        let end = match el.id {
            ID_INFO => {
                parse_info(data, &el, &mut state)?;
                el.end
            }
            ID_TRACKS => {
                parse_tracks(data, &el, &mut state)?;
                el.end
            }
            ID_CLUSTER => parse_cluster(data, &el, segment.end, &mut state, progress)?,
            _ => el.end,
        };
        progress.advance_to(end as u64)?;
        pos = end;

        if state.has_everything() {
            state.stopped_early = pos < segment.end;
            break;
        }
    }

    Ok(state)
}

fn parse_info(data: &[u8], info: &Element, state: &mut SegmentState) -> ContainerResult<()> {
    for_each_child(data, info, |child| {
        match child.id {
            ID_TIMECODE_SCALE => {
                let scale = read_uint(data, child)?;
                if scale == 0 {
                    return Err(ContainerError::invalid("TimecodeScale is zero"));
                }
                state.timecode_scale = scale;
            }
            ID_DURATION => state.duration_ticks = Some(read_float(data, child)?),
            _ => {}
        }
        Ok(())
    })
}

fn parse_tracks(data: &[u8], tracks: &Element, state: &mut SegmentState) -> ContainerResult<()> {
    for_each_child(data, tracks, |entry| {
        if entry.id != ID_TRACK_ENTRY || state.video.is_some() {
            return Ok(());
        }
        let mut track = VideoTrack::default();
        let mut track_type = 0;
        for_each_child(data, entry, |child| {
            match child.id {
                ID_TRACK_NUMBER => track.number = read_uint(data, child)?,
                ID_TRACK_TYPE => track_type = read_uint(data, child)?,
                ID_CODEC_ID => track.codec_id = read_string(data, child),
                ID_DEFAULT_DURATION => track.default_duration_ns = Some(read_uint(data, child)?),
                ID_VIDEO => for_each_child(data, child, |field| {
                    match field.id {
                        ID_PIXEL_WIDTH => track.width = read_uint(data, field)?,
                        ID_PIXEL_HEIGHT => track.height = read_uint(data, field)?,
                        _ => {}
                    }
                    Ok(())
                })?,
                _ => {}
            }
            Ok(())
        })?;
        if track_type == TRACK_TYPE_VIDEO {
            state.video = Some(track);
        }
        Ok(())
    })
}

/// Returns the offset where the cluster ends. A cluster of unknown size ends
/// at the next top-level element.
fn parse_cluster(
    data: &[u8],
    cluster: &Element,
    segment_end: usize,
    state: &mut SegmentState,
    progress: &mut ScanProgress,
) -> ContainerResult<usize> {
    let limit = if cluster.unknown_size {
        segment_end
    } else {
        cluster.end
    };
    let mut cluster_timecode = 0i64;
    let mut pos = cluster.data_start;

    while pos < limit {
        if cluster.unknown_size {
            let (id, _) = read_id(data, pos, limit)?;
            if is_top_level(id) {
                return Ok(pos);
            }
        }
        let child = read_element(data, pos, limit)?;
        if child.unknown_size {
            return Err(ContainerError::invalid(format!(
                "cluster child {:#x} has unknown size",
                child.id
            )));
        }
        match child.id {
            ID_CLUSTER_TIMECODE => {
                cluster_timecode = i64::try_from(read_uint(data, &child)?)
                    .map_err(|_| ContainerError::invalid("cluster timecode out of range"))?
            }
            ID_SIMPLE_BLOCK => record_block(data, &child, cluster_timecode, state)?,
            ID_BLOCK_GROUP => for_each_child(data, &child, |grandchild| {
                if grandchild.id == ID_BLOCK {
                    record_block(data, grandchild, cluster_timecode, state)?;
                }
                Ok(())
            })?,
            _ => {}
        }
        progress.advance_to(child.end as u64)?;
        pos = child.end;
    }

    Ok(limit)
}

fn record_block(
    data: &[u8],
    block: &Element,
    cluster_timecode: i64,
    state: &mut SegmentState,
) -> ContainerResult<()> {
    let (track_number, len, _) = read_vint(data, block.data_start, block.end, 8, false)?;
    let tc_pos = block.data_start + len;
    if tc_pos + 2 > block.end {
        return Err(ContainerError::Truncated {
            offset: block.end as u64,
        });
    }
    let relative = i16::from_be_bytes([data[tc_pos], data[tc_pos + 1]]) as i64;
    let timestamp = cluster_timecode
        .checked_add(relative)
        .ok_or_else(|| ContainerError::invalid("block timestamp out of range"))?;

    let stats = state.blocks.entry(track_number).or_default();
    stats.max_timestamp = if stats.count == 0 {
        timestamp
    } else {
        stats.max_timestamp.max(timestamp)
    };
    stats.count += 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressReporter;
    use tokio_util::sync::CancellationToken;

    fn id_bytes(id: u32) -> Vec<u8> {
        let bytes = id.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        bytes[skip..].to_vec()
    }

    fn el(id: u32, payload: &[u8]) -> Vec<u8> {
        let mut out = id_bytes(id);
        out.push(0x01);
        out.extend_from_slice(&(payload.len() as u64).to_be_bytes()[1..]);
        out.extend_from_slice(payload);
        out
    }

    fn el_unknown(id: u32, payload: &[u8]) -> Vec<u8> {
        let mut out = id_bytes(id);
        out.push(0xFF);
        out.extend_from_slice(payload);
        out
    }

    fn uint(id: u32, value: u64) -> Vec<u8> {
        el(id, &value.to_be_bytes())
    }

    fn simple_block(track: u8, timecode: i16) -> Vec<u8> {
        let mut payload = vec![0x80 | track];
        payload.extend_from_slice(&timecode.to_be_bytes());
        payload.push(0x80);
        payload.extend_from_slice(&[0u8; 8]);
        el(ID_SIMPLE_BLOCK, &payload)
    }

    fn header(doc_type: &str) -> Vec<u8> {
        el(ID_EBML, &el(ID_DOC_TYPE, doc_type.as_bytes()))
    }

    fn tracks(width: u64, height: u64, track_type: u64) -> Vec<u8> {
        let video = [uint(ID_PIXEL_WIDTH, width), uint(ID_PIXEL_HEIGHT, height)].concat();
        let entry = [
            uint(ID_TRACK_NUMBER, 1),
            uint(ID_TRACK_TYPE, track_type),
            el(ID_CODEC_ID, b"V_VP9"),
            el(ID_VIDEO, &video),
        ]
        .concat();
        el(ID_TRACKS, &el(ID_TRACK_ENTRY, &entry))
    }

    fn cluster(timecode: u64, blocks: &[i16]) -> Vec<u8> {
        let mut payload = uint(ID_CLUSTER_TIMECODE, timecode);
        for tc in blocks {
            payload.extend(simple_block(1, *tc));
        }
        el(ID_CLUSTER, &payload)
    }

    fn build_webm(info: Vec<u8>, tracks: Vec<u8>, clusters: Vec<u8>) -> Vec<u8> {
        let mut out = header("webm");
        out.extend(el(ID_SEGMENT, &[info, tracks, clusters].concat()));
        out
    }

    fn info(duration_ms: Option<f64>) -> Vec<u8> {
        let mut payload = uint(ID_TIMECODE_SCALE, 1_000_000);
        if let Some(d) = duration_ms {
            payload.extend(el(ID_DURATION, &d.to_be_bytes()));
        }
        el(ID_INFO, &payload)
    }

    fn scan(total: usize) -> ScanProgress {
        let (reporter, _stream) = ProgressReporter::channel();
        ScanProgress::new(reporter.span(0, 99), CancellationToken::new(), total as u64)
    }

    #[test]
    fn test_vint_sizes() {
        assert_eq!(read_vint(&[0x81], 0, 1, 8, false).unwrap(), (1, 1, false));
        assert_eq!(read_vint(&[0x40, 0x02], 0, 2, 8, false).unwrap(), (2, 2, false));
        assert!(read_vint(&[0xFF], 0, 1, 8, false).unwrap().2);
        assert!(read_vint(&[0x00], 0, 1, 8, false).is_err());
    }

    #[test]
    fn test_ids_keep_marker() {
        let data = id_bytes(ID_SEGMENT);
        assert_eq!(read_id(&data, 0, data.len()).unwrap(), (ID_SEGMENT, 4));
    }

    #[test]
    fn test_parse_with_duration() {
        let data = build_webm(
            info(Some(2500.0)),
            tracks(1280, 720, 1),
            cluster(0, &[0, 40, 80]),
        );
        let info = parse(&data, &mut scan(data.len())).unwrap();
        assert_eq!((info.width, info.height), (1280, 720));
        assert_eq!(info.duration_seconds, 2.5);
        assert_eq!(info.codec, "vp9");
        assert_eq!(info.frame_count, Some(3));
    }

    #[test]
    fn test_duration_from_blocks() {
        let clusters = [cluster(0, &[0, 500]), cluster(1000, &[0, 500])].concat();
        let data = build_webm(info(None), tracks(320, 240, 1), clusters);
        let info = parse(&data, &mut scan(data.len())).unwrap();
        assert_eq!(info.frame_count, Some(4));
        assert_eq!(info.duration_seconds, 1.5);
    }

    #[test]
    fn test_unknown_size_segment_and_cluster() {
        let mut clusters = el_unknown(
            ID_CLUSTER,
            &[uint(ID_CLUSTER_TIMECODE, 0), simple_block(1, 0)].concat(),
        );
        clusters.extend(el_unknown(
            ID_CLUSTER,
            &[uint(ID_CLUSTER_TIMECODE, 2000), simple_block(1, 0)].concat(),
        ));
        let mut data = header("matroska");
        data.extend(el_unknown(
            ID_SEGMENT,
            &[info(None), tracks(640, 480, 1), clusters].concat(),
        ));

        let info = parse(&data, &mut scan(data.len())).unwrap();
        assert_eq!(info.frame_count, Some(2));
        assert_eq!(info.duration_seconds, 2.0);
    }

    #[test]
    fn test_no_frames_is_rejected() {
        let data = build_webm(info(Some(1000.0)), tracks(320, 240, 1), Vec::new());
        let err = parse(&data, &mut scan(data.len())).unwrap_err();
        assert!(err.to_string().contains("no frames"));
    }

    #[test]
    fn test_audio_only_is_rejected() {
        let data = build_webm(info(Some(1000.0)), tracks(0, 0, 2), cluster(0, &[0]));
        let err = parse(&data, &mut scan(data.len())).unwrap_err();
        assert!(err.to_string().contains("no video track"));
    }

    #[test]
    fn test_wrong_doc_type_is_rejected() {
        let mut data = header("avi");
        data.extend(el(ID_SEGMENT, &info(Some(1.0))));
        assert!(parse(&data, &mut scan(data.len())).is_err());
    }

    #[test]
    fn test_truncated_segment_is_rejected() {
        let mut data = build_webm(info(Some(1000.0)), tracks(320, 240, 1), cluster(0, &[0]));
        data.truncate(data.len() - 4);
        assert!(matches!(
            parse(&data, &mut scan(data.len())),
            Err(ContainerError::Truncated { .. })
        ));
    }

    #[test]
    fn test_block_timestamp_overflow_is_rejected() {
        let data = build_webm(
            info(Some(1000.0)),
            tracks(320, 240, 1),
            cluster(i64::MAX as u64, &[1]),
        );
        let err = parse(&data, &mut scan(data.len())).unwrap_err();
        assert!(err.to_string().contains("block timestamp out of range"));
    }

    #[test]
    fn test_cluster_timecode_above_i64_is_rejected() {
        let data = build_webm(
            info(Some(1000.0)),
            tracks(320, 240, 1),
            cluster(u64::MAX, &[0]),
        );
        let err = parse(&data, &mut scan(data.len())).unwrap_err();
        assert!(err.to_string().contains("cluster timecode out of range"));
    }

    #[test]
    fn test_huge_element_size_is_truncated() {
        let mut data = header("webm");
        data.extend(id_bytes(ID_SEGMENT));
        // largest known 8-byte size
        data.extend_from_slice(&[0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE]);
        data.extend(info(Some(1000.0)));
        assert!(matches!(
            parse(&data, &mut scan(data.len())),
            Err(ContainerError::Truncated { .. })
        ));
    }

    #[test]
    fn test_garbage_is_rejected() {
        let data = b"RIFF\x00\x00\x00\x00AVI LIST".to_vec();
        assert!(parse(&data, &mut scan(data.len())).is_err());
    }

    #[test]
    fn test_codec_names() {
        assert_eq!(codec_name("V_MPEG4/ISO/AVC"), "h264");
        assert_eq!(codec_name("V_AV1"), "av1");
        assert_eq!(codec_name("V_THEORA"), "theora");
    }
}
