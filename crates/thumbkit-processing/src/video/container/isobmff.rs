//! ISO base media file format (mp4, mov, m4v).
//!
//! Walks `moov/trak/mdia/minf/stbl` for the first `vide` track and counts
//! fragment samples in `moof/traf/trun` for fragmented files.

use super::{check_info, ByteReader, ContainerError, ContainerInfo, ContainerResult, ScanProgress};
use std::collections::HashMap;

const HANDLER_VIDEO: &[u8; 4] = b"vide";

struct BoxHeader {
    kind: [u8; 4],
    content_start: usize,
    end: usize,
}

impl BoxHeader {
    fn reader<'a>(&self, data: &'a [u8]) -> ByteReader<'a> {
        ByteReader::new(&data[self.content_start..self.end], self.content_start as u64)
    }
}

fn read_box(data: &[u8], offset: usize, limit: usize) -> ContainerResult<BoxHeader> {
    let mut r = ByteReader::new(&data[offset..limit], offset as u64);
    let size32 = r.u32()?;
    let kind = r.fourcc()?;
    let size = match size32 {
        0 => (limit - offset) as u64,
        1 => r.u64()?,
        n => n as u64,
    };

    let header_len = r.position();
    if size < header_len as u64 {
        return Err(ContainerError::invalid(format!(
            "box '{}' at offset {} has size {} smaller than its header",
            fourcc_str(&kind),
            offset,
            size
        )));
    }
    // size >= header_len, so a box that fits always ends past its offset
    let end = (offset as u64)
        .checked_add(size)
        .filter(|end| *end <= limit as u64)
        .ok_or(ContainerError::Truncated {
            offset: limit as u64,
        })?;

    Ok(BoxHeader {
        kind,
        content_start: offset + header_len,
        end: end as usize,
    })
}

/// Visit the child boxes of `parent`. Trailing bytes too short for a box
/// header are padding.
fn for_each_child<F>(data: &[u8], parent: &BoxHeader, mut visit: F) -> ContainerResult<()>
where
    F: FnMut(&BoxHeader) -> ContainerResult<()>,
{
    let mut offset = parent.content_start;
    while parent.end - offset >= 8 {
        let child = read_box(data, offset, parent.end)?;
        visit(&child)?;
        offset = child.end;
    }
    Ok(())
}

fn fourcc_str(kind: &[u8; 4]) -> String {
    String::from_utf8_lossy(kind).trim_end_matches('\0').trim().to_string()
}

#[derive(Debug, Default)]
struct Track {
    track_id: u32,
    handler: Option<[u8; 4]>,
    tkhd_width: u32,
    tkhd_height: u32,
    timescale: u32,
    duration: u64,
    codec: Option<[u8; 4]>,
    entry_width: u16,
    entry_height: u16,
    stsz_samples: Option<u64>,
    stts_samples: Option<u64>,
}

impl Track {
    fn is_video(&self) -> bool {
        self.handler.as_ref() == Some(HANDLER_VIDEO)
    }

    fn indexed_samples(&self) -> u64 {
        match (self.stsz_samples, self.stts_samples) {
            (Some(n), _) if n > 0 => n,
            (_, Some(n)) => n,
            _ => 0,
        }
    }

    fn duration_seconds(&self) -> Option<f64> {
        (self.timescale > 0 && self.duration > 0)
            .then(|| self.duration as f64 / self.timescale as f64)
    }
}

#[derive(Debug, Default)]
struct Movie {
    timescale: u32,
    duration: u64,
    fragment_duration: u64,
    tracks: Vec<Track>,
}

impl Movie {
    fn duration_seconds(&self) -> Option<f64> {
        if self.timescale == 0 {
            return None;
        }
        let ticks = if self.duration > 0 {
            self.duration
        } else {
            self.fragment_duration
        };
        (ticks > 0).then(|| ticks as f64 / self.timescale as f64)
    }
}

pub fn parse(data: &[u8], progress: &mut ScanProgress) -> ContainerResult<ContainerInfo> {
    progress.advance_to(0)?;

    let mut movie: Option<Movie> = None;
    let mut has_mdat = false;
    let mut fragment_samples: HashMap<u32, u64> = HashMap::new();
    let mut offset = 0usize;

    while offset < data.len() {
        if data.len() - offset < 8 {
            return Err(ContainerError::Truncated {
                offset: data.len() as u64,
            });
        }
        let header = read_box(data, offset, data.len())?;
        if offset == 0 && !header.kind.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            return Err(ContainerError::invalid("not an ISO base media file"));
        }

        match &header.kind {
            b"moov" => movie = Some(parse_moov(data, &header, progress)?),
            b"moof" => parse_moof(data, &header, &mut fragment_samples)?,
            b"mdat" => has_mdat = true,
            _ => {}
        }

        progress.advance_to(header.end as u64)?;
        offset = header.end;
    }

    let movie = movie.ok_or_else(|| ContainerError::invalid("missing moov box"))?;
    let track = movie
        .tracks
        .iter()
        .find(|t| t.is_video())
        .ok_or_else(|| ContainerError::invalid("no video track"))?;
    if !has_mdat {
        return Err(ContainerError::invalid("no media data (mdat) box"));
    }

    let (width, height) = if track.entry_width > 0 && track.entry_height > 0 {
        (track.entry_width as u32, track.entry_height as u32)
    } else {
        // tkhd stores 16.16 fixed point
        (track.tkhd_width >> 16, track.tkhd_height >> 16)
    };

    let frames = track.indexed_samples()
        + fragment_samples.get(&track.track_id).copied().unwrap_or(0);
    let duration_seconds = movie
        .duration_seconds()
        .or_else(|| track.duration_seconds())
        .unwrap_or(0.0);
    let track_seconds = track.duration_seconds().unwrap_or(duration_seconds);
    let framerate = (frames > 0 && track_seconds > 0.0).then(|| (frames as f64 / track_seconds) as f32);

    let info = ContainerInfo {
        duration_seconds,
        width,
        height,
        codec: track
            .codec
            .as_ref()
            .map(fourcc_str)
            .unwrap_or_else(|| "unknown".to_string()),
        frame_count: Some(frames),
        framerate,
    };
    check_info(&info)?;
    Ok(info)
}

fn parse_moov(
    data: &[u8],
    moov: &BoxHeader,
    progress: &mut ScanProgress,
) -> ContainerResult<Movie> {
    let mut movie = Movie::default();
    for_each_child(data, moov, |child| {
        match &child.kind {
            b"mvhd" => {
                let mut r = child.reader(data);
                let version = r.u8()?;
                r.skip(3)?;
                if version == 1 {
                    r.skip(16)?;
                    movie.timescale = r.u32()?;
                    let duration = r.u64()?;
                    movie.duration = if duration == u64::MAX { 0 } else { duration };
                } else {
                    r.skip(8)?;
                    movie.timescale = r.u32()?;
                    let duration = r.u32()?;
                    movie.duration = if duration == u32::MAX { 0 } else { duration as u64 };
                }
            }
            b"trak" => {
                movie.tracks.push(parse_trak(data, child)?);
                progress.advance_to(child.end as u64)?;
            }
            b"mvex" => {
                for_each_child(data, child, |grandchild| {
                    if &grandchild.kind == b"mehd" {
                        let mut r = grandchild.reader(data);
                        let version = r.u8()?;
                        r.skip(3)?;
                        movie.fragment_duration = if version == 1 {
                            r.u64()?
                        } else {
                            r.u32()? as u64
                        };
                    }
                    Ok(())
                })?;
            }
            _ => {}
        }
        Ok(())
    })?;
    Ok(movie)
}

fn parse_trak(data: &[u8], trak: &BoxHeader) -> ContainerResult<Track> {
    let mut track = Track::default();
    for_each_child(data, trak, |child| {
        match &child.kind {
            b"tkhd" => parse_tkhd(data, child, &mut track)?,
            b"mdia" => parse_mdia(data, child, &mut track)?,
            _ => {}
        }
        Ok(())
    })?;
    Ok(track)
}

fn parse_tkhd(data: &[u8], tkhd: &BoxHeader, track: &mut Track) -> ContainerResult<()> {
    let mut r = tkhd.reader(data);
    let version = r.u8()?;
    r.skip(3)?;
    if version == 1 {
        r.skip(16)?;
        track.track_id = r.u32()?;
        r.skip(4 + 8)?;
    } else {
        r.skip(8)?;
        track.track_id = r.u32()?;
        r.skip(4 + 4)?;
    }
    // reserved, layer, alternate group, volume, reserved, matrix
    r.skip(16 + 36)?;
    track.tkhd_width = r.u32()?;
    track.tkhd_height = r.u32()?;
    Ok(())
}

fn parse_mdia(data: &[u8], mdia: &BoxHeader, track: &mut Track) -> ContainerResult<()> {
    for_each_child(data, mdia, |child| {
        match &child.kind {
            b"mdhd" => {
                let mut r = child.reader(data);
                let version = r.u8()?;
                r.skip(3)?;
                if version == 1 {
                    r.skip(16)?;
                    track.timescale = r.u32()?;
                    track.duration = r.u64()?;
                } else {
                    r.skip(8)?;
                    track.timescale = r.u32()?;
                    track.duration = r.u32()? as u64;
                }
            }
            b"hdlr" => {
                let mut r = child.reader(data);
                r.skip(8)?;
                track.handler = Some(r.fourcc()?);
            }
            b"minf" => {
                for_each_child(data, child, |grandchild| {
                    if &grandchild.kind == b"stbl" {
                        parse_stbl(data, grandchild, track)?;
                    }
                    Ok(())
                })?;
            }
            _ => {}
        }
        Ok(())
    })
}

fn parse_stbl(data: &[u8], stbl: &BoxHeader, track: &mut Track) -> ContainerResult<()> {
    for_each_child(data, stbl, |child| {
        match &child.kind {
            b"stsd" => {
                let mut r = child.reader(data);
                r.skip(4)?;
                let entry_count = r.u32()?;
                if entry_count > 0 {
                    let _entry_size = r.u32()?;
                    track.codec = Some(r.fourcc()?);
                    if track.is_video() {
                        // reserved, data reference index, pre-defined and reserved fields
                        r.skip(6 + 2 + 2 + 2 + 12)?;
                        track.entry_width = r.u16()?;
                        track.entry_height = r.u16()?;
                    }
                }
            }
            b"stsz" => {
                let mut r = child.reader(data);
                r.skip(4 + 4)?;
                track.stsz_samples = Some(r.u32()? as u64);
            }
            b"stts" => {
                let mut r = child.reader(data);
                r.skip(4)?;
                let entry_count = r.u32()?;
                let mut samples = 0u64;
                for _ in 0..entry_count {
                    samples += r.u32()? as u64;
                    r.skip(4)?;
                }
                track.stts_samples = Some(samples);
            }
            _ => {}
        }
        Ok(())
    })
}

fn parse_moof(
    data: &[u8],
    moof: &BoxHeader,
    samples: &mut HashMap<u32, u64>,
) -> ContainerResult<()> {
    for_each_child(data, moof, |traf| {
        if &traf.kind != b"traf" {
            return Ok(());
        }
        let mut track_id = None;
        let mut count = 0u64;
        for_each_child(data, traf, |child| {
            match &child.kind {
                b"tfhd" => {
                    let mut r = child.reader(data);
                    r.skip(4)?;
                    track_id = Some(r.u32()?);
                }
                b"trun" => {
                    let mut r = child.reader(data);
                    r.skip(4)?;
                    count += r.u32()? as u64;
                }
                _ => {}
            }
            Ok(())
        })?;
        if let Some(id) = track_id {
            *samples.entry(id).or_insert(0) += count;
        }
        Ok(())
    })
}
