//! Initialization records exchanged with the external controller.
//!
//! Each `read_*` function decodes the body of one initialization
//! command, checks every field's name and declared range, and returns
//! typed values ready for the matching [`Partition`](crate::Partition)
//! call. The `write_*` functions produce the same records; controllers
//! and tests use them.
//!
//! Ranges follow the controller protocol, in SI units with
//! `R` = [`R_PARTICLE`]:
//!
//! | Field | Range |
//! |-------|-------|
//! | `box_size` | `[2R, 1e5·R]` per axis |
//! | `T` | `[1, 2000]` K |
//! | `dt` | `[1 ps, 1000 ns]` |
//! | `dU_max` | `[1e-3·kT, 200·kT]` |
//! | `fric_gamma` | `[1e-14, 1e-8]` |
//! | `force_update` | `[1, 1000]` |
//! | `r_pair_cutoff` | `[2R, 5R]` |
//! | `r_neighbor` | `[2R, 10R]` |
//! | `tags` | `[0, 1e7]` |
//! | `tag` (rules) | `[0, 1e6]` |

use std::error::Error;
use std::fmt;

use glam::DVec3;
use partix_comm::{CommRule, Instruction};
use partix_core::units::{KB, NS, PS, R_PARTICLE};
use partix_core::{ChannelIndex, ConfigError, PartitionId, PeriodicBox, ProtocolError, RuleTag, Tag};
use partix_msg::{MessageError, MessageReader, MessageWriter};
use partix_space::{
    Axis, Direction, Extent, JunctionCell, JunctionSet, LineJunction, PointJunction,
    SurfaceJunction,
};

use crate::config::{InterpTable, SystemParams};

/// Largest particle tag accepted from the controller.
pub const MAX_TAG: i32 = 10_000_000;
/// Largest protocol rule tag accepted from the controller.
pub const MAX_RULE_TAG: i32 = 1_000_000;

// ── HandshakeError ─────────────────────────────────────────────────

/// A handshake record could not be accepted.
#[derive(Clone, Debug, PartialEq)]
pub enum HandshakeError {
    /// The record is malformed at `field`.
    Message {
        /// Field being read.
        field: &'static str,
        /// Codec failure.
        source: MessageError,
    },
    /// `field` holds a value the engine cannot use.
    Config {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        source: ConfigError,
    },
    /// `field` names an unknown protocol instruction.
    Protocol {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        source: ProtocolError,
    },
}

impl HandshakeError {
    /// Name of the field that failed.
    pub fn field(&self) -> &'static str {
        match self {
            Self::Message { field, .. } | Self::Config { field, .. } | Self::Protocol { field, .. } => {
                field
            }
        }
    }
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message { field, source } => write!(f, "field `{field}`: {source}"),
            Self::Config { field, source } => write!(f, "field `{field}`: {source}"),
            Self::Protocol { field, source } => write!(f, "field `{field}`: {source}"),
        }
    }
}

impl Error for HandshakeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Message { source, .. } => Some(source),
            Self::Config { source, .. } => Some(source),
            Self::Protocol { source, .. } => Some(source),
        }
    }
}

impl From<MessageError> for HandshakeError {
    fn from(source: MessageError) -> Self {
        Self::Message {
            field: "record",
            source,
        }
    }
}

// ── Field reader ───────────────────────────────────────────────────

fn message(field: &'static str) -> impl Fn(MessageError) -> HandshakeError {
    move |source| HandshakeError::Message { field, source }
}

fn config(field: &'static str, source: ConfigError) -> HandshakeError {
    HandshakeError::Config { field, source }
}

fn check(field: &'static str, value: f64, min: f64, max: f64) -> Result<f64, HandshakeError> {
    if value.is_finite() && value >= min && value <= max {
        Ok(value)
    } else {
        Err(config(
            field,
            ConfigError::OutOfRange {
                name: field,
                value,
                min,
                max,
            },
        ))
    }
}

fn check_vec(field: &'static str, v: DVec3, min: DVec3, max: DVec3) -> Result<DVec3, HandshakeError> {
    for k in 0..3 {
        check(field, v[k], min[k], max[k])?;
    }
    Ok(v)
}

fn double(r: &mut MessageReader<'_>, field: &'static str, min: f64, max: f64) -> Result<f64, HandshakeError> {
    let v = r.field_double(field).map_err(message(field))?;
    check(field, v, min, max)
}

fn int(r: &mut MessageReader<'_>, field: &'static str, min: i32, max: i32) -> Result<i32, HandshakeError> {
    let v = r.field_int(field).map_err(message(field))?;
    check(field, f64::from(v), f64::from(min), f64::from(max))?;
    Ok(v)
}

fn index(r: &mut MessageReader<'_>, field: &'static str, len: usize) -> Result<usize, HandshakeError> {
    let v = r.field_int(field).map_err(message(field))?;
    match usize::try_from(v) {
        Ok(i) if i < len => Ok(i),
        _ => Err(config(
            field,
            ConfigError::UnknownReference {
                what: field,
                index: v.max(0) as usize,
                len,
            },
        )),
    }
}

fn vec(r: &mut MessageReader<'_>, field: &'static str, min: DVec3, max: DVec3) -> Result<DVec3, HandshakeError> {
    let v = r.field_vec(field).map_err(message(field))?;
    check_vec(field, v, min, max)
}

fn table(r: &mut MessageReader<'_>, field: &'static str) -> Result<InterpTable, HandshakeError> {
    r.expect_name(field).map_err(message(field))?;
    let x_min = double(r, "x_min", 0.0, f64::MAX)?;
    let x_prec = double(r, "x_prec", 0.0, f64::MAX)?;
    let values = r.field_doubles("table").map_err(message("table"))?;
    InterpTable::new(x_min, x_prec, values).map_err(|e| config(field, e))
}

fn records<'a, T, F>(
    r: &mut MessageReader<'a>,
    field: &'static str,
    each: F,
) -> Result<Vec<T>, HandshakeError>
where
    F: FnMut(&mut MessageReader<'a>) -> Result<T, HandshakeError>,
{
    r.expect_name(field).map_err(message(field))?;
    r.read_array(each)
}

fn axis(r: &mut MessageReader<'_>) -> Result<Axis, HandshakeError> {
    let a = int(r, "axis", 0, 2)?;
    Axis::from_index(a as usize).ok_or_else(|| {
        config(
            "axis",
            ConfigError::OutOfRange {
                name: "axis",
                value: f64::from(a),
                min: 0.0,
                max: 2.0,
            },
        )
    })
}

// ── System ─────────────────────────────────────────────────────────

/// Decode `initialize_system`.
pub fn read_system(r: &mut MessageReader<'_>) -> Result<SystemParams, HandshakeError> {
    let rp = R_PARTICLE;
    let box_size = vec(r, "box_size", DVec3::splat(2.0 * rp), DVec3::splat(1e5 * rp))?;
    let temperature = double(r, "T", 1.0, 2000.0)?;
    let kt = KB * temperature;
    let dt = double(r, "dt", PS, 1000.0 * NS)?;
    let du_max = double(r, "dU_max", 1e-3 * kt, 200.0 * kt)?;
    let friction = double(r, "fric_gamma", 1e-14, 1e-8)?;
    let force_update_rate = int(r, "force_update", 1, 1000)? as u32;
    let r_pair_cutoff = double(r, "r_pair_cutoff", 2.0 * rp, 5.0 * rp)?;
    let pair_potential = table(r, "pair_potential")?;
    let pair_force = table(r, "pair_force")?;
    let r_neighbor = double(r, "r_neighbor", 2.0 * rp, 10.0 * rp)?;
    let params = SystemParams {
        box_size,
        temperature,
        dt,
        du_max,
        friction,
        force_update_rate,
        r_pair_cutoff,
        r_neighbor,
        pair_potential,
        pair_force,
    };
    params.validate().map_err(|e| config("system", e))?;
    Ok(params)
}

fn put_table(w: &mut MessageWriter, field: &str, t: &InterpTable) -> Result<(), MessageError> {
    w.write_str(field)?;
    w.field_double("x_min", t.x_min())?;
    w.field_double("x_prec", t.x_prec())?;
    w.field_doubles("table", t.values())
}

/// Encode `initialize_system`.
pub fn write_system(w: &mut MessageWriter, p: &SystemParams) -> Result<(), MessageError> {
    w.field_vec("box_size", p.box_size)?;
    w.field_double("T", p.temperature)?;
    w.field_double("dt", p.dt)?;
    w.field_double("dU_max", p.du_max)?;
    w.field_double("fric_gamma", p.friction)?;
    w.field_int("force_update", p.force_update_rate.min(i32::MAX as u32) as i32)?;
    w.field_double("r_pair_cutoff", p.r_pair_cutoff)?;
    put_table(w, "pair_potential", &p.pair_potential)?;
    put_table(w, "pair_force", &p.pair_force)?;
    w.field_double("r_neighbor", p.r_neighbor)
}

// ── Random ─────────────────────────────────────────────────────────

/// Decode `initialize_random`: a bare seed.
pub fn read_random(r: &mut MessageReader<'_>) -> Result<u32, HandshakeError> {
    r.read_uint().map_err(message("seed"))
}

/// Encode `initialize_random`.
pub fn write_random(w: &mut MessageWriter, seed: u32) -> Result<(), MessageError> {
    w.write_uint(seed)
}

// ── Cell state ─────────────────────────────────────────────────────

/// Decoded `initialize_cell_state`.
#[derive(Clone, Debug, PartialEq)]
pub struct CellState {
    /// The partition's extent.
    pub extent: Extent,
    /// Initial positions, inside the extent.
    pub positions: Vec<DVec3>,
    /// Tags, parallel to `positions`.
    pub tags: Vec<Tag>,
}

fn read_extent(r: &mut MessageReader<'_>, field: &'static str, pbox: &PeriodicBox) -> Result<DVec3, HandshakeError> {
    vec(r, field, DVec3::ZERO, pbox.size())
}

/// Decode `initialize_cell_state` for a run in `pbox`.
pub fn read_cell_state(r: &mut MessageReader<'_>, pbox: &PeriodicBox) -> Result<CellState, HandshakeError> {
    let min = read_extent(r, "min_extent", pbox)?;
    let max = read_extent(r, "max_extent", pbox)?;
    let extent = Extent::new(min, max).map_err(|e| config("max_extent", e))?;
    let positions = r.field_vecs("positions").map_err(message("positions"))?;
    for &p in &positions {
        check_vec("positions", p, min, max)?;
    }
    let raw = r.field_ints("tags").map_err(message("tags"))?;
    let mut tags = Vec::with_capacity(raw.len());
    for t in raw {
        check("tags", f64::from(t), 0.0, f64::from(MAX_TAG))?;
        tags.push(Tag(t as u32));
    }
    if tags.len() != positions.len() {
        return Err(config(
            "tags",
            ConfigError::LengthMismatch {
                what: "tags",
                expected: positions.len(),
                found: tags.len(),
            },
        ));
    }
    Ok(CellState {
        extent,
        positions,
        tags,
    })
}

/// Encode `initialize_cell_state`.
pub fn write_cell_state(
    w: &mut MessageWriter,
    extent: &Extent,
    positions: &[DVec3],
    tags: &[Tag],
) -> Result<(), MessageError> {
    w.field_vec("min_extent", extent.min())?;
    w.field_vec("max_extent", extent.max())?;
    w.field_vecs("positions", positions)?;
    let tags: Vec<i32> = tags.iter().map(|t| t.0.min(i32::MAX as u32) as i32).collect();
    w.field_ints("tags", &tags)
}

// ── Cell comm ──────────────────────────────────────────────────────

/// Decoded `initialize_cell_comm`.
#[derive(Clone, Debug, PartialEq)]
pub struct CommSetup {
    /// Peer on each channel.
    pub peers: Vec<PartitionId>,
    /// Ordered protocol rules.
    pub rules: Vec<CommRule>,
}

/// Decode `initialize_cell_comm` for a run of `partitions` partitions.
pub fn read_cell_comm(r: &mut MessageReader<'_>, partitions: usize) -> Result<CommSetup, HandshakeError> {
    let peers = records(r, "comms", |r| {
        Ok(PartitionId(index(r, "comm_rank", partitions)? as u32))
    })?;
    let channels = peers.len();
    let rules = records(r, "comm_rules", |r| {
        let code = int(r, "inst", 1, 2)?;
        let instruction = Instruction::from_code(code)
            .map_err(|source| HandshakeError::Protocol { field: "inst", source })?;
        let channel = ChannelIndex(index(r, "comm_index", channels)? as u32);
        let tag = RuleTag(int(r, "tag", 0, MAX_RULE_TAG)? as u32);
        Ok(CommRule {
            instruction,
            channel,
            tag,
        })
    })?;
    Ok(CommSetup { peers, rules })
}

/// Encode `initialize_cell_comm`.
pub fn write_cell_comm(
    w: &mut MessageWriter,
    peers: &[PartitionId],
    rules: &[CommRule],
) -> Result<(), MessageError> {
    w.field_records("comms", peers, |w, p| w.field_int("comm_rank", p.0 as i32))?;
    w.field_records("comm_rules", rules, |w, rule| {
        w.field_int("inst", rule.instruction.code())?;
        w.field_int("comm_index", rule.channel.0 as i32)?;
        w.field_int("tag", rule.tag.0 as i32)
    })
}

// ── Cell junctions ─────────────────────────────────────────────────

/// Decode `initialize_cell_junctions` for the partition spanning `this`
/// with `channels` channels.
pub fn read_cell_junctions(
    r: &mut MessageReader<'_>,
    this: &Extent,
    pbox: &PeriodicBox,
    channels: usize,
) -> Result<JunctionSet, HandshakeError> {
    let cells = records(r, "jcells", |r| {
        let channel = ChannelIndex(index(r, "comm_index", channels)? as u32);
        let min = read_extent(r, "min_extent", pbox)?;
        let max = read_extent(r, "max_extent", pbox)?;
        let extent = Extent::new(min, max).map_err(|e| config("max_extent", e))?;
        Ok(JunctionCell { channel, extent })
    })?;
    let n_cells = cells.len();
    let surfaces = records(r, "surface_junctions", |r| {
        let cell = index(r, "cell_index", n_cells)?;
        let normal = axis(r)?;
        let sign = int(r, "dir", -1, 1)?;
        let dir = Direction::from_sign(sign).ok_or_else(|| {
            config(
                "dir",
                ConfigError::InvalidParameter {
                    name: "dir",
                    reason: "direction must be -1 or 1".into(),
                },
            )
        })?;
        Ok(SurfaceJunction {
            cell,
            axis: normal,
            dir,
        })
    })?;
    let lines = records(r, "line_junctions", |r| {
        let cell = index(r, "cell_index", n_cells)?;
        let edge = axis(r)?;
        let (a1, a2) = edge.others();
        let (i1, i2) = (a1.index(), a2.index());
        let offset1 = double(r, "offset1", this.min()[i1], this.max()[i1])?;
        let offset2 = double(r, "offset2", this.min()[i2], this.max()[i2])?;
        Ok(LineJunction {
            cell,
            axis: edge,
            offset1,
            offset2,
        })
    })?;
    let points = records(r, "point_junctions", |r| {
        let cell = index(r, "cell_index", n_cells)?;
        let offset = vec(r, "offset", this.min(), this.max())?;
        Ok(PointJunction { cell, offset })
    })?;
    log::info!(
        "decoded {} junction cells: surface={} line={} point={}",
        cells.len(),
        surfaces.len(),
        lines.len(),
        points.len()
    );
    JunctionSet::new(this, channels, cells, surfaces, lines, points)
        .map_err(|e| config("junctions", e))
}

/// Encode `initialize_cell_junctions`.
pub fn write_cell_junctions(w: &mut MessageWriter, j: &JunctionSet) -> Result<(), MessageError> {
    w.field_records("jcells", j.cells(), |w, c| {
        w.field_int("comm_index", c.channel.0 as i32)?;
        w.field_vec("min_extent", c.extent.min())?;
        w.field_vec("max_extent", c.extent.max())
    })?;
    w.field_records("surface_junctions", j.surfaces(), |w, s| {
        w.field_int("cell_index", s.cell as i32)?;
        w.field_int("axis", s.axis.index() as i32)?;
        w.field_int("dir", s.dir.sign())
    })?;
    w.field_records("line_junctions", j.lines(), |w, l| {
        w.field_int("cell_index", l.cell as i32)?;
        w.field_int("axis", l.axis.index() as i32)?;
        w.field_double("offset1", l.offset1)?;
        w.field_double("offset2", l.offset2)
    })?;
    w.field_records("point_junctions", j.points(), |w, p| {
        w.field_int("cell_index", p.cell as i32)?;
        w.field_vec("offset", p.offset)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::params;
    use partix_space::Decomposition;

    fn encode(f: impl FnOnce(&mut MessageWriter) -> Result<(), MessageError>) -> Vec<u8> {
        let mut w = MessageWriter::new();
        f(&mut w).unwrap();
        w.into_bytes()
    }

    #[test]
    fn system_record_decodes() {
        let p = params();
        let bytes = encode(|w| write_system(w, &p));
        let mut r = MessageReader::new(&bytes);
        let back = read_system(&mut r).unwrap();
        r.finish().unwrap();
        assert_eq!(back.force_update_rate, 10);
        assert!((back.dt - p.dt).abs() < 1e-19);
        assert!((back.r_neighbor - p.r_neighbor).abs() < 1e-16);
        assert_eq!(back.pair_force.values().len(), 400);
    }

    #[test]
    fn hot_system_is_rejected_at_the_temperature() {
        let mut p = params();
        p.temperature = 2500.0;
        let bytes = encode(|w| write_system(w, &p));
        let err = read_system(&mut MessageReader::new(&bytes)).unwrap_err();
        assert_eq!(err.field(), "T");
        assert!(matches!(err, HandshakeError::Config { source: ConfigError::OutOfRange { .. }, .. }));
    }

    #[test]
    fn misnamed_field_is_reported() {
        let bytes = encode(|w| w.field_double("T", 300.0));
        let err = read_system(&mut MessageReader::new(&bytes)).unwrap_err();
        assert_eq!(err.field(), "box_size");
    }

    #[test]
    fn seed_is_a_bare_uint() {
        let bytes = encode(|w| write_random(w, 0xC0FFEE));
        assert_eq!(bytes.len(), 4);
        assert_eq!(read_random(&mut MessageReader::new(&bytes)).unwrap(), 0xC0FFEE);
    }

    #[test]
    fn cell_state_checks_tags_and_extent() {
        let pbox = PeriodicBox::new(DVec3::splat(10.0)).unwrap();
        let extent = Extent::new(DVec3::ZERO, DVec3::splat(5.0)).unwrap();
        let ok = encode(|w| write_cell_state(w, &extent, &[DVec3::splat(1.0)], &[Tag(4)]));
        let s = read_cell_state(&mut MessageReader::new(&ok), &pbox).unwrap();
        assert_eq!(s.tags, vec![Tag(4)]);

        let outside = encode(|w| write_cell_state(w, &extent, &[DVec3::splat(6.0)], &[Tag(4)]));
        let err = read_cell_state(&mut MessageReader::new(&outside), &pbox).unwrap_err();
        assert_eq!(err.field(), "positions");

        let big = encode(|w| write_cell_state(w, &extent, &[DVec3::ONE], &[Tag(20_000_000)]));
        let err = read_cell_state(&mut MessageReader::new(&big), &pbox).unwrap_err();
        assert_eq!(err.field(), "tags");

        let short = encode(|w| write_cell_state(w, &extent, &[DVec3::ONE, DVec3::ONE], &[Tag(0)]));
        let err = read_cell_state(&mut MessageReader::new(&short), &pbox).unwrap_err();
        assert!(matches!(err, HandshakeError::Config { source: ConfigError::LengthMismatch { .. }, .. }));
    }

    #[test]
    fn comm_and_junctions_match_the_decomposition() {
        let pbox = PeriodicBox::new(DVec3::splat(12.0)).unwrap();
        let d = Decomposition::uniform(pbox, [2, 2, 1]).unwrap();
        let rules = partix_comm::build_rules(&d).unwrap();
        let cell = &d.cells()[1];

        let bytes = encode(|w| write_cell_comm(w, &cell.neighbors, &rules[1]));
        let setup = read_cell_comm(&mut MessageReader::new(&bytes), d.len()).unwrap();
        assert_eq!(setup.peers, cell.neighbors);
        assert_eq!(setup.rules, rules[1]);

        let bytes = encode(|w| write_cell_junctions(w, &cell.junctions));
        let j = read_cell_junctions(
            &mut MessageReader::new(&bytes),
            &cell.extent,
            &pbox,
            cell.neighbors.len(),
        )
        .unwrap();
        assert_eq!(j.cells().len(), cell.junctions.cells().len());
        assert_eq!(j.surfaces(), cell.junctions.surfaces());
        assert_eq!(j.points().len(), cell.junctions.points().len());
    }

    #[test]
    fn rule_naming_a_missing_channel_is_rejected() {
        let rules = [CommRule::send(ChannelIndex(3), RuleTag(1))];
        let bytes = encode(|w| write_cell_comm(w, &[PartitionId(1)], &rules));
        let err = read_cell_comm(&mut MessageReader::new(&bytes), 2).unwrap_err();
        assert_eq!(err.field(), "comm_index");
    }

    #[test]
    fn unknown_instruction_code_is_rejected() {
        let bytes = encode(|w| {
            w.field_records("comms", &[1], |w, &p| w.field_int("comm_rank", p))?;
            w.field_records("comm_rules", &[7], |w, &inst| {
                w.field_int("inst", inst)?;
                w.field_int("comm_index", 0)?;
                w.field_int("tag", 1)
            })
        });
        let err = read_cell_comm(&mut MessageReader::new(&bytes), 2).unwrap_err();
        assert_eq!(err.field(), "inst");
    }
}
