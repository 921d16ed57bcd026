//! Minimal MQTT 3.1.1 codec.
//!
//! Covers exactly the traffic a status session needs: CONNECT/CONNACK,
//! a QoS 0 retained PUBLISH, SUBSCRIBE/SUBACK for host-side verification,
//! and the ping pair. Encoding writes into caller buffers; decoding borrows
//! from the receive buffer and reports how many bytes one packet consumed,
//! so partial reads can simply accumulate and retry.

pub const PACKET_CONNECT: u8 = 0x10;
pub const PACKET_CONNACK: u8 = 0x20;
pub const PACKET_PUBLISH: u8 = 0x30;
pub const PACKET_SUBACK: u8 = 0x90;
pub const PACKET_PINGRESP: u8 = 0xD0;

const FLAG_RETAIN: u8 = 0x01;
const FLAG_DUP: u8 = 0x08;
const SUBSCRIBE_FIXED: u8 = 0x82;
const CONNECT_FLAG_CLEAN_SESSION: u8 = 0x02;
const CONNECT_FLAG_PASSWORD: u8 = 0x40;
const CONNECT_FLAG_USERNAME: u8 = 0x80;
const REMAINING_LENGTH_MAX: usize = 268_435_455;

pub const PINGREQ_FRAME: [u8; 2] = [0xC0, 0x00];
pub const DISCONNECT_FRAME: [u8; 2] = [0xE0, 0x00];

/// CONNACK return code for an accepted session.
pub const CONNACK_ACCEPTED: u8 = 0x00;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MqttError {
    BufferTooSmall,
    Malformed,
}

#[derive(Clone, Copy, Debug)]
pub struct ConnectOptions<'a> {
    pub client_id: &'a str,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
    pub keep_alive_secs: u16,
}

struct Writer<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> Writer<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, len: 0 }
    }

    fn push(&mut self, byte: u8) -> Result<(), MqttError> {
        if self.len >= self.buf.len() {
            return Err(MqttError::BufferTooSmall);
        }
        self.buf[self.len] = byte;
        self.len += 1;
        Ok(())
    }

    fn extend(&mut self, bytes: &[u8]) -> Result<(), MqttError> {
        if self.len + bytes.len() > self.buf.len() {
            return Err(MqttError::BufferTooSmall);
        }
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }

    fn push_u16(&mut self, value: u16) -> Result<(), MqttError> {
        self.extend(&value.to_be_bytes())
    }

    // UTF-8 string field: two-byte length prefix plus the bytes.
    fn push_str(&mut self, value: &str) -> Result<(), MqttError> {
        let len = u16::try_from(value.len()).map_err(|_| MqttError::Malformed)?;
        self.push_u16(len)?;
        self.extend(value.as_bytes())
    }
}

fn encode_remaining_length(writer: &mut Writer<'_>, mut value: usize) -> Result<(), MqttError> {
    if value > REMAINING_LENGTH_MAX {
        return Err(MqttError::Malformed);
    }
    loop {
        let mut byte = (value % 128) as u8;
        value /= 128;
        if value > 0 {
            byte |= 0x80;
        }
        writer.push(byte)?;
        if value == 0 {
            return Ok(());
        }
    }
}

/// Decodes a remaining-length varint. Returns `None` when more bytes are
/// needed, otherwise the value and how many bytes it occupied.
pub fn decode_remaining_length(buf: &[u8]) -> Result<Option<(usize, usize)>, MqttError> {
    let mut value = 0usize;
    for (index, &byte) in buf.iter().enumerate() {
        if index == 4 {
            return Err(MqttError::Malformed);
        }
        value |= ((byte & 0x7F) as usize) << (7 * index as u32);
        if byte & 0x80 == 0 {
            return Ok(Some((value, index + 1)));
        }
    }
    Ok(None)
}

fn string_field_len(value: &str) -> usize {
    2 + value.len()
}

/// Encodes a clean-session CONNECT packet. The password is only written
/// when a username is present, matching the 3.1.1 flag rules.
pub fn encode_connect(buf: &mut [u8], options: &ConnectOptions<'_>) -> Result<usize, MqttError> {
    let mut flags = CONNECT_FLAG_CLEAN_SESSION;
    let mut body_len = 10 + string_field_len(options.client_id);
    if let Some(username) = options.username {
        flags |= CONNECT_FLAG_USERNAME;
        body_len += string_field_len(username);
        if let Some(password) = options.password {
            flags |= CONNECT_FLAG_PASSWORD;
            body_len += string_field_len(password);
        }
    }

    let mut writer = Writer::new(buf);
    writer.push(PACKET_CONNECT)?;
    encode_remaining_length(&mut writer, body_len)?;
    writer.push_str("MQTT")?;
    writer.push(0x04)?; // protocol level 3.1.1
    writer.push(flags)?;
    writer.push_u16(options.keep_alive_secs)?;
    writer.push_str(options.client_id)?;
    if let Some(username) = options.username {
        writer.push_str(username)?;
        if let Some(password) = options.password {
            writer.push_str(password)?;
        }
    }
    Ok(writer.len)
}

/// Encodes a QoS 0 PUBLISH with the retain flag set. QoS 0 carries no
/// packet identifier.
pub fn encode_publish_retained(
    buf: &mut [u8],
    topic: &str,
    payload: &[u8],
) -> Result<usize, MqttError> {
    let body_len = string_field_len(topic) + payload.len();
    let mut writer = Writer::new(buf);
    writer.push(PACKET_PUBLISH | FLAG_RETAIN)?;
    encode_remaining_length(&mut writer, body_len)?;
    writer.push_str(topic)?;
    writer.extend(payload)?;
    Ok(writer.len)
}

/// Encodes a single-filter SUBSCRIBE at QoS 0.
pub fn encode_subscribe(
    buf: &mut [u8],
    packet_id: u16,
    topic_filter: &str,
) -> Result<usize, MqttError> {
    let body_len = 2 + string_field_len(topic_filter) + 1;
    let mut writer = Writer::new(buf);
    writer.push(SUBSCRIBE_FIXED)?;
    encode_remaining_length(&mut writer, body_len)?;
    writer.push_u16(packet_id)?;
    writer.push_str(topic_filter)?;
    writer.push(0x00)?;
    Ok(writer.len)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Packet<'a> {
    Connack {
        session_present: bool,
        return_code: u8,
    },
    Suback {
        packet_id: u16,
        return_code: u8,
    },
    Publish {
        topic: &'a str,
        payload: &'a [u8],
        retained: bool,
        duplicate: bool,
    },
    Pingresp,
    Other {
        packet_type: u8,
    },
}

/// Decodes one packet from the front of `buf`. `Ok(None)` means the buffer
/// does not yet hold a complete packet; otherwise the packet and the number
/// of bytes it consumed are returned.
pub fn decode(buf: &[u8]) -> Result<Option<(Packet<'_>, usize)>, MqttError> {
    if buf.is_empty() {
        return Ok(None);
    }
    let first = buf[0];
    let (remaining, varint_len) = match decode_remaining_length(&buf[1..])? {
        Some(decoded) => decoded,
        None => return Ok(None),
    };
    let header_len = 1 + varint_len;
    let total = header_len + remaining;
    if buf.len() < total {
        return Ok(None);
    }
    let body = &buf[header_len..total];

    let packet = match first & 0xF0 {
        PACKET_CONNACK => {
            if body.len() != 2 {
                return Err(MqttError::Malformed);
            }
            Packet::Connack {
                session_present: body[0] & 0x01 != 0,
                return_code: body[1],
            }
        }
        PACKET_SUBACK => {
            if body.len() < 3 {
                return Err(MqttError::Malformed);
            }
            Packet::Suback {
                packet_id: u16::from_be_bytes([body[0], body[1]]),
                return_code: body[2],
            }
        }
        PACKET_PUBLISH => parse_publish(first, body)?,
        PACKET_PINGRESP => Packet::Pingresp,
        _ => Packet::Other {
            packet_type: first >> 4,
        },
    };
    Ok(Some((packet, total)))
}

fn parse_publish(first: u8, body: &[u8]) -> Result<Packet<'_>, MqttError> {
    let qos = (first >> 1) & 0x03;
    if qos == 3 {
        return Err(MqttError::Malformed);
    }
    if body.len() < 2 {
        return Err(MqttError::Malformed);
    }
    let topic_len = u16::from_be_bytes([body[0], body[1]]) as usize;
    let mut offset = 2 + topic_len;
    if body.len() < offset {
        return Err(MqttError::Malformed);
    }
    let topic = core::str::from_utf8(&body[2..offset]).map_err(|_| MqttError::Malformed)?;
    if qos > 0 {
        if body.len() < offset + 2 {
            return Err(MqttError::Malformed);
        }
        offset += 2;
    }
    Ok(Packet::Publish {
        topic,
        payload: &body[offset..],
        retained: first & FLAG_RETAIN != 0,
        duplicate: first & FLAG_DUP != 0,
    })
}
