//! Test fixtures: encoded images and synthetic video containers

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

/// Encode a solid-colour image of the given size
pub fn create_test_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let rgba = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
    });
    let img = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(rgba).to_rgb8()),
        _ => DynamicImage::ImageRgba8(rgba),
    };
    let mut buffer = Vec::new();
    img.write_to(&mut Cursor::new(&mut buffer), format)
        .expect("fixture image encodes");
    buffer
}

pub fn create_test_png(width: u32, height: u32) -> Vec<u8> {
    create_test_image(width, height, ImageFormat::Png)
}

pub fn create_test_jpeg(width: u32, height: u32) -> Vec<u8> {
    create_test_image(width, height, ImageFormat::Jpeg)
}

/// Parameters of a synthetic video
#[derive(Debug, Clone, Copy)]
pub struct VideoSpec {
    pub width: u16,
    pub height: u16,
    pub frames: u32,
    /// Total duration in milliseconds; zero leaves the duration field out
    pub duration_ms: u32,
}

impl VideoSpec {
    pub fn new(width: u16, height: u16, frames: u32, duration_ms: u32) -> Self {
        Self {
            width,
            height,
            frames,
            duration_ms,
        }
    }
}

fn mp4_box(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(kind);
    out.extend_from_slice(payload);
    out
}

fn full_box(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut body = vec![0u8; 4];
    body.extend_from_slice(payload);
    mp4_box(kind, &body)
}

fn be32(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

/// Minimal progressive ISO base media file with one `avc1` track
pub fn create_test_mp4(spec: VideoSpec, major_brand: &[u8; 4]) -> Vec<u8> {
    const TRACK_TIMESCALE: u32 = 90_000;

    let mut tkhd = be32(&[0, 0, 1, 0, spec.duration_ms]);
    tkhd.extend_from_slice(&[0u8; 16 + 36]);
    tkhd.extend(be32(&[(spec.width as u32) << 16, (spec.height as u32) << 16]));

    let mut entry = vec![0u8; 24];
    entry.extend_from_slice(&spec.width.to_be_bytes());
    entry.extend_from_slice(&spec.height.to_be_bytes());
    entry.extend_from_slice(&[0u8; 50]);
    let mut stsd = be32(&[1]);
    stsd.extend(mp4_box(b"avc1", &entry));

    let track_ticks = (spec.duration_ms as u64 * TRACK_TIMESCALE as u64 / 1000) as u32;
    let delta = if spec.frames > 0 {
        track_ticks / spec.frames
    } else {
        0
    };
    let stbl = [
        full_box(b"stsd", &stsd),
        full_box(b"stts", &be32(&[1, spec.frames, delta])),
        full_box(b"stsz", &be32(&[0, spec.frames])),
    ]
    .concat();

    let mut hdlr = be32(&[0]);
    hdlr.extend_from_slice(b"vide");
    hdlr.extend_from_slice(&[0u8; 12]);
    hdlr.extend_from_slice(b"VideoHandler\0");

    let mdia = [
        full_box(b"mdhd", &be32(&[0, 0, TRACK_TIMESCALE, track_ticks, 0])),
        full_box(b"hdlr", &hdlr),
        mp4_box(b"minf", &mp4_box(b"stbl", &stbl)),
    ]
    .concat();
    let trak = mp4_box(b"trak", &[full_box(b"tkhd", &tkhd), mp4_box(b"mdia", &mdia)].concat());

    let mut mvhd = be32(&[0, 0, 1000, spec.duration_ms]);
    mvhd.extend_from_slice(&[0u8; 80]);
    let moov = mp4_box(b"moov", &[full_box(b"mvhd", &mvhd), trak].concat());

    let mut ftyp = major_brand.to_vec();
    ftyp.extend(be32(&[0x200]));
    ftyp.extend_from_slice(b"isomiso2avc1mp41");

    let mut out = mp4_box(b"ftyp", &ftyp);
    out.extend(moov);
    out.extend(mp4_box(b"mdat", &vec![0u8; 128 + spec.frames as usize * 16]));
    out
}

const EBML_ID_HEADER: u32 = 0x1A45_DFA3;
const EBML_ID_DOC_TYPE: u32 = 0x4282;
const MKV_ID_SEGMENT: u32 = 0x1853_8067;
const MKV_ID_INFO: u32 = 0x1549_A966;
const MKV_ID_TIMECODE_SCALE: u32 = 0x2A_D7B1;
const MKV_ID_DURATION: u32 = 0x4489;
const MKV_ID_TRACKS: u32 = 0x1654_AE6B;
const MKV_ID_TRACK_ENTRY: u32 = 0xAE;
const MKV_ID_TRACK_NUMBER: u32 = 0xD7;
const MKV_ID_TRACK_TYPE: u32 = 0x83;
const MKV_ID_CODEC_ID: u32 = 0x86;
const MKV_ID_VIDEO: u32 = 0xE0;
const MKV_ID_PIXEL_WIDTH: u32 = 0xB0;
const MKV_ID_PIXEL_HEIGHT: u32 = 0xBA;
const MKV_ID_CLUSTER: u32 = 0x1F43_B675;
const MKV_ID_CLUSTER_TIMECODE: u32 = 0xE7;
const MKV_ID_SIMPLE_BLOCK: u32 = 0xA3;

fn ebml_element(id: u32, payload: &[u8]) -> Vec<u8> {
    let id_bytes = id.to_be_bytes();
    let skip = id_bytes.iter().take_while(|b| **b == 0).count();
    let mut out = id_bytes[skip..].to_vec();
    out.push(0x01);
    out.extend_from_slice(&(payload.len() as u64).to_be_bytes()[1..]);
    out.extend_from_slice(payload);
    out
}

fn ebml_uint(id: u32, value: u64) -> Vec<u8> {
    ebml_element(id, &value.to_be_bytes())
}

/// Minimal WebM/Matroska file with one VP9 track and one block per frame
pub fn create_test_webm(spec: VideoSpec, doc_type: &str) -> Vec<u8> {
    // Without a duration, frames are spaced 40ms apart
    let frame_ms = if spec.frames > 0 && spec.duration_ms > 0 {
        spec.duration_ms / spec.frames
    } else {
        40
    };
    let blocks: Vec<i16> = (0..spec.frames).map(|f| (f * frame_ms) as i16).collect();
    build_webm(spec, doc_type, 0, &blocks)
}

/// One-block WebM file with an arbitrary cluster timecode and block offset
pub fn create_webm_with_cluster(timecode: u64, relative: i16) -> Vec<u8> {
    build_webm(VideoSpec::new(320, 240, 1, 0), "webm", timecode, &[relative])
}

fn build_webm(spec: VideoSpec, doc_type: &str, timecode: u64, blocks: &[i16]) -> Vec<u8> {
    let mut out = ebml_element(
        EBML_ID_HEADER,
        &ebml_element(EBML_ID_DOC_TYPE, doc_type.as_bytes()),
    );

    let mut info = ebml_uint(MKV_ID_TIMECODE_SCALE, 1_000_000);
    if spec.duration_ms > 0 {
        info.extend(ebml_element(
            MKV_ID_DURATION,
            &(spec.duration_ms as f64).to_be_bytes(),
        ));
    }

    let video = [
        ebml_uint(MKV_ID_PIXEL_WIDTH, spec.width as u64),
        ebml_uint(MKV_ID_PIXEL_HEIGHT, spec.height as u64),
    ]
    .concat();
    let entry = [
        ebml_uint(MKV_ID_TRACK_NUMBER, 1),
        ebml_uint(MKV_ID_TRACK_TYPE, 1),
        ebml_element(MKV_ID_CODEC_ID, b"V_VP9"),
        ebml_element(MKV_ID_VIDEO, &video),
    ]
    .concat();

    let mut cluster = ebml_uint(MKV_ID_CLUSTER_TIMECODE, timecode);
    for relative in blocks {
        let mut block = vec![0x81];
        block.extend_from_slice(&relative.to_be_bytes());
        block.push(0x80);
        block.extend_from_slice(&[0u8; 24]);
        cluster.extend(ebml_element(MKV_ID_SIMPLE_BLOCK, &block));
    }

    let mut segment = ebml_element(MKV_ID_INFO, &info);
    segment.extend(ebml_element(
        MKV_ID_TRACKS,
        &ebml_element(MKV_ID_TRACK_ENTRY, &entry),
    ));
    if !blocks.is_empty() {
        segment.extend(ebml_element(MKV_ID_CLUSTER, &cluster));
    }
    out.extend(ebml_element(MKV_ID_SEGMENT, &segment));
    out
}
