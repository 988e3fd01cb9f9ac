//! Codec for the Gran Turismo 7 "Simulator Interface" packet.
//!
//! The console sends 296 byte datagrams encrypted with Salsa20/20. The key is
//! fixed, the 8 byte nonce is derived from a 4 byte seed stored in clear at
//! offset 0x40 of every packet. After decryption the first 4 bytes must read
//! as the magic `0x47375330` ("0S7G" little-endian), anything else is
//! treated as noise and dropped.

use log::trace;

use super::{ReservedFields, Rotation, Snapshot, Vector3, Wheels};

/// Size of the packet requested by the `A` heartbeat.
pub const PACKET_SIZE: usize = 0x128;
pub const MAGIC: u32 = 0x4737_5330;

const SALSA_KEY: &[u8; 32] = b"Simulator Interface Packet GT7 v";
const NONCE_XOR: u32 = 0xDEAD_BEAF;
const SEED_OFFSET: usize = 0x40;

/// Decrypts a raw datagram and checks the magic number.
///
/// Datagrams longer than [`PACKET_SIZE`] are truncated, shorter ones are
/// rejected.
pub fn decrypt_packet(raw: &[u8]) -> Option<[u8; PACKET_SIZE]> {
    if raw.len() < PACKET_SIZE {
        trace!("Dropping datagram of {} bytes", raw.len());
        return None;
    }
    let mut buf = [0u8; PACKET_SIZE];
    buf.copy_from_slice(&raw[..PACKET_SIZE]);

    let seed = read_u32(&buf, SEED_OFFSET);
    apply_keystream(&mut buf, seed);

    let magic = read_u32(&buf, 0x00);
    if magic != MAGIC {
        trace!("Dropping datagram with magic {:#010x}", magic);
        return None;
    }
    Some(buf)
}

/// Encrypts a plaintext packet with the keystream derived from `seed` and
/// stores the seed in clear so that [`decrypt_packet`] can recover it.
pub fn encrypt_packet(plain: &[u8; PACKET_SIZE], seed: u32) -> [u8; PACKET_SIZE] {
    let mut buf = *plain;
    apply_keystream(&mut buf, seed);
    buf[SEED_OFFSET..SEED_OFFSET + 4].copy_from_slice(&seed.to_le_bytes());
    buf
}

/// Decrypts and decodes one datagram. Returns `None` for anything that is not
/// a valid telemetry packet.
pub fn decode_packet(raw: &[u8]) -> Option<Snapshot> {
    decrypt_packet(raw).map(|data| parse_decrypted(&data))
}

/// Reads every field out of an already decrypted packet.
pub fn parse_decrypted(data: &[u8; PACKET_SIZE]) -> Snapshot {
    let car_speed = 3.6 * read_f32(data, 0x4C);
    let tyre_radius = read_wheels(data, 0xB4);
    let wheel_rps = read_wheels(data, 0xA4);
    let wheel_speed = Wheels::new(
        (3.6 * tyre_radius.front_left * wheel_rps.front_left).abs(),
        (3.6 * tyre_radius.front_right * wheel_rps.front_right).abs(),
        (3.6 * tyre_radius.rear_left * wheel_rps.rear_left).abs(),
        (3.6 * tyre_radius.rear_right * wheel_rps.rear_right).abs(),
    );
    // a stationary car would divide by zero
    let speed_divisor = if car_speed == 0. { 1. } else { car_speed };
    let flags = data[0x8E];
    let gear = data[0x90];

    let mut gear_ratios = [0f32; 8];
    for (i, ratio) in gear_ratios.iter_mut().enumerate() {
        *ratio = read_f32(data, 0x104 + i * 4);
    }

    Snapshot {
        package_id: read_i32(data, 0x70),
        position: read_vector(data, 0x04),
        velocity: read_vector(data, 0x10),
        rotation: Rotation {
            pitch: read_f32(data, 0x1C),
            yaw: read_f32(data, 0x20),
            roll: read_f32(data, 0x24),
        },
        angular_velocity: read_vector(data, 0x2C),
        body_height: 1000. * read_f32(data, 0x38),
        rpm: read_f32(data, 0x3C),
        current_fuel: read_f32(data, 0x44),
        fuel_capacity: read_f32(data, 0x48),
        car_speed,
        boost: read_f32(data, 0x50) - 1.,
        oil_pressure: read_f32(data, 0x54),
        water_temp: read_f32(data, 0x58),
        oil_temp: read_f32(data, 0x5C),
        tyre_temp: read_wheels(data, 0x60),
        current_lap: read_i16(data, 0x74),
        total_laps: read_i16(data, 0x76),
        best_lap: read_i32(data, 0x78),
        last_lap: read_i32(data, 0x7C),
        time_on_track_ms: read_i32(data, 0x80),
        current_position: read_i16(data, 0x84),
        total_positions: read_i16(data, 0x86),
        rpm_rev_warning: read_u16(data, 0x88),
        rpm_rev_limiter: read_u16(data, 0x8A),
        estimated_top_speed: read_i16(data, 0x8C),
        flags,
        in_race: flags & 0b01 != 0,
        is_paused: flags & 0b10 != 0,
        current_gear: gear & 0x0F,
        suggested_gear: gear >> 4,
        throttle: data[0x91],
        brake: data[0x92],
        wheel_rps,
        tyre_radius,
        tyre_diameter: tyre_radius.map(|r| 200. * r),
        wheel_speed,
        slip_ratio: wheel_speed.map(|s| s / speed_divisor),
        suspension_height: read_wheels(data, 0xC4),
        clutch: read_f32(data, 0xF4),
        clutch_engaged: read_f32(data, 0xF8),
        rpm_after_clutch: read_f32(data, 0xFC),
        gear_ratios,
        car_id: read_i32(data, 0x124),
        reserved: ReservedFields {
            rotation_extra: read_f32(data, 0x28),
            secondary_flags: data[0x8F],
            byte_93: data[0x93],
            floats_94: [
                read_f32(data, 0x94),
                read_f32(data, 0x98),
                read_f32(data, 0x9C),
                read_f32(data, 0xA0),
            ],
            floats_d4: {
                let mut floats = [0f32; 8];
                for (i, value) in floats.iter_mut().enumerate() {
                    *value = read_f32(data, 0xD4 + i * 4);
                }
                floats
            },
            gear_extra: read_f32(data, 0x100),
        },
    }
}

/// Writes the raw fields of a snapshot back into a plaintext packet, the
/// inverse of [`parse_decrypted`]. Derived values (wheel speed, slip ratio,
/// tyre diameter) are recomputed on decode and therefore not written.
pub fn encode_snapshot(snapshot: &Snapshot) -> [u8; PACKET_SIZE] {
    let mut data = [0u8; PACKET_SIZE];
    write_u32(&mut data, 0x00, MAGIC);
    write_vector(&mut data, 0x04, &snapshot.position);
    write_vector(&mut data, 0x10, &snapshot.velocity);
    write_f32(&mut data, 0x1C, snapshot.rotation.pitch);
    write_f32(&mut data, 0x20, snapshot.rotation.yaw);
    write_f32(&mut data, 0x24, snapshot.rotation.roll);
    write_f32(&mut data, 0x28, snapshot.reserved.rotation_extra);
    write_vector(&mut data, 0x2C, &snapshot.angular_velocity);
    write_f32(&mut data, 0x38, snapshot.body_height / 1000.);
    write_f32(&mut data, 0x3C, snapshot.rpm);
    write_f32(&mut data, 0x44, snapshot.current_fuel);
    write_f32(&mut data, 0x48, snapshot.fuel_capacity);
    write_f32(&mut data, 0x4C, snapshot.car_speed / 3.6);
    write_f32(&mut data, 0x50, snapshot.boost + 1.);
    write_f32(&mut data, 0x54, snapshot.oil_pressure);
    write_f32(&mut data, 0x58, snapshot.water_temp);
    write_f32(&mut data, 0x5C, snapshot.oil_temp);
    write_wheels(&mut data, 0x60, &snapshot.tyre_temp);
    write_u32(&mut data, 0x70, snapshot.package_id as u32);
    write_u16(&mut data, 0x74, snapshot.current_lap as u16);
    write_u16(&mut data, 0x76, snapshot.total_laps as u16);
    write_u32(&mut data, 0x78, snapshot.best_lap as u32);
    write_u32(&mut data, 0x7C, snapshot.last_lap as u32);
    write_u32(&mut data, 0x80, snapshot.time_on_track_ms as u32);
    write_u16(&mut data, 0x84, snapshot.current_position as u16);
    write_u16(&mut data, 0x86, snapshot.total_positions as u16);
    write_u16(&mut data, 0x88, snapshot.rpm_rev_warning);
    write_u16(&mut data, 0x8A, snapshot.rpm_rev_limiter);
    write_u16(&mut data, 0x8C, snapshot.estimated_top_speed as u16);

    let mut flags = snapshot.flags & !0b11;
    if snapshot.in_race {
        flags |= 0b01;
    }
    if snapshot.is_paused {
        flags |= 0b10;
    }
    data[0x8E] = flags;
    data[0x8F] = snapshot.reserved.secondary_flags;
    data[0x90] = (snapshot.suggested_gear << 4) | (snapshot.current_gear & 0x0F);
    data[0x91] = snapshot.throttle;
    data[0x92] = snapshot.brake;
    data[0x93] = snapshot.reserved.byte_93;
    for (i, value) in snapshot.reserved.floats_94.iter().enumerate() {
        write_f32(&mut data, 0x94 + i * 4, *value);
    }
    write_wheels(&mut data, 0xA4, &snapshot.wheel_rps);
    write_wheels(&mut data, 0xB4, &snapshot.tyre_radius);
    write_wheels(&mut data, 0xC4, &snapshot.suspension_height);
    for (i, value) in snapshot.reserved.floats_d4.iter().enumerate() {
        write_f32(&mut data, 0xD4 + i * 4, *value);
    }
    write_f32(&mut data, 0xF4, snapshot.clutch);
    write_f32(&mut data, 0xF8, snapshot.clutch_engaged);
    write_f32(&mut data, 0xFC, snapshot.rpm_after_clutch);
    write_f32(&mut data, 0x100, snapshot.reserved.gear_extra);
    for (i, ratio) in snapshot.gear_ratios.iter().enumerate() {
        write_f32(&mut data, 0x104 + i * 4, *ratio);
    }
    write_u32(&mut data, 0x124, snapshot.car_id as u32);
    data
}

fn apply_keystream(buf: &mut [u8], seed: u32) {
    let mut nonce = [0u8; 8];
    nonce[..4].copy_from_slice(&(seed ^ NONCE_XOR).to_le_bytes());
    nonce[4..].copy_from_slice(&seed.to_le_bytes());

    for (block_idx, chunk) in buf.chunks_mut(64).enumerate() {
        let keystream = salsa20_block(SALSA_KEY, &nonce, block_idx as u64);
        for (b, k) in chunk.iter_mut().zip(keystream.iter()) {
            *b ^= k;
        }
    }
}

fn salsa20_block(key: &[u8; 32], nonce: &[u8; 8], counter: u64) -> [u8; 64] {
    let word = |b: &[u8], i: usize| u32::from_le_bytes([b[i], b[i + 1], b[i + 2], b[i + 3]]);

    // "expand 32-byte k"
    let mut state = [0u32; 16];
    state[0] = 0x6170_7865;
    state[5] = 0x3320_646e;
    state[10] = 0x7962_2d32;
    state[15] = 0x6b20_6574;
    for i in 0..4 {
        state[1 + i] = word(key, i * 4);
        state[11 + i] = word(key, 16 + i * 4);
    }
    state[6] = word(nonce, 0);
    state[7] = word(nonce, 4);
    state[8] = counter as u32;
    state[9] = (counter >> 32) as u32;

    let mut working = state;
    for _ in 0..10 {
        // columns
        quarter_round(&mut working, 0, 4, 8, 12);
        quarter_round(&mut working, 5, 9, 13, 1);
        quarter_round(&mut working, 10, 14, 2, 6);
        quarter_round(&mut working, 15, 3, 7, 11);
        // rows
        quarter_round(&mut working, 0, 1, 2, 3);
        quarter_round(&mut working, 5, 6, 7, 4);
        quarter_round(&mut working, 10, 11, 8, 9);
        quarter_round(&mut working, 15, 12, 13, 14);
    }

    let mut out = [0u8; 64];
    for (i, (w, s)) in working.iter().zip(state.iter()).enumerate() {
        out[i * 4..(i + 1) * 4].copy_from_slice(&w.wrapping_add(*s).to_le_bytes());
    }
    out
}

fn quarter_round(s: &mut [u32; 16], a: usize, b: usize, c: usize, d: usize) {
    s[b] ^= s[a].wrapping_add(s[d]).rotate_left(7);
    s[c] ^= s[b].wrapping_add(s[a]).rotate_left(9);
    s[d] ^= s[c].wrapping_add(s[b]).rotate_left(13);
    s[a] ^= s[d].wrapping_add(s[c]).rotate_left(18);
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn read_i32(data: &[u8], offset: usize) -> i32 {
    read_u32(data, offset) as i32
}

fn read_f32(data: &[u8], offset: usize) -> f32 {
    f32::from_bits(read_u32(data, offset))
}

fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn read_i16(data: &[u8], offset: usize) -> i16 {
    read_u16(data, offset) as i16
}

fn read_vector(data: &[u8], offset: usize) -> Vector3 {
    Vector3 {
        x: read_f32(data, offset),
        y: read_f32(data, offset + 4),
        z: read_f32(data, offset + 8),
    }
}

fn read_wheels(data: &[u8], offset: usize) -> Wheels<f32> {
    Wheels::new(
        read_f32(data, offset),
        read_f32(data, offset + 4),
        read_f32(data, offset + 8),
        read_f32(data, offset + 12),
    )
}

fn write_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn write_u16(data: &mut [u8], offset: usize, value: u16) {
    data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn write_f32(data: &mut [u8], offset: usize, value: f32) {
    write_u32(data, offset, value.to_bits());
}

fn write_vector(data: &mut [u8], offset: usize, value: &Vector3) {
    write_f32(data, offset, value.x);
    write_f32(data, offset + 4, value.y);
    write_f32(data, offset + 8, value.z);
}

fn write_wheels(data: &mut [u8], offset: usize, value: &Wheels<f32>) {
    for (i, v) in value.to_array().iter().enumerate() {
        write_f32(data, offset + i * 4, *v);
    }
}
