use byteorder::{BigEndian, ByteOrder};
use msgtree::dump::format_tree;
use msgtree::{Endianness, MessageTree, NodeId, NodeRef};
use pcap_parser::pcapng::Block as PcapNgBlock;
use pcap_parser::traits::{PcapNGPacketBlock, PcapReaderIterator};
use pcap_parser::{Linktype, PcapBlockOwned, PcapError};
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

/// Counters printed at the end of a run.
#[derive(Debug, Default)]
struct Stats {
    packets: u64,
    udp_payloads: u64,
    records: u64,
    decoded_records: u64,
    incomplete_payloads: u64,
    overflowing_payloads: u64,
}

struct Options {
    verbose: bool,
    width: usize,
    frame_filter: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    let mut raw_args: Vec<String> = std::env::args().skip(1).collect();
    let verbose = if let Some(pos) = raw_args.iter().position(|a| a == "--verbose" || a == "-v") {
        raw_args.remove(pos);
        true
    } else {
        false
    };
    let width: usize = raw_args
        .iter()
        .position(|a| a.starts_with("--width="))
        .and_then(|pos| {
            let arg = raw_args.remove(pos);
            arg.strip_prefix("--width=").and_then(|s| s.parse().ok())
        })
        .unwrap_or(2);
    let frame_filter: Option<u64> = raw_args
        .iter()
        .position(|a| a.starts_with("--frame="))
        .and_then(|pos| {
            let arg = raw_args.remove(pos);
            arg.strip_prefix("--frame=").and_then(|s| s.parse().ok())
        });
    let pcap_path: PathBuf = match raw_args.into_iter().next() {
        Some(path) => PathBuf::from(path),
        None => {
            eprintln!("Usage: dissect_pcap [--verbose] [--width=N] [--frame=N] <capture.pcap|capture.pcapng>");
            std::process::exit(2);
        }
    };
    let options = Options {
        verbose,
        width,
        frame_filter,
    };

    let mut stats = Stats::default();

    // Probe file type (pcap vs pcapng) using the magic at start of file.
    let mut probe = [0u8; 4];
    {
        let mut f = File::open(&pcap_path)?;
        f.read_exact(&mut probe)?;
    }
    let file = File::open(&pcap_path)?;
    if probe == [0x0a, 0x0d, 0x0d, 0x0a] {
        run_pcapng(file, &options, &mut stats)?;
    } else {
        run_legacy_pcap(file, &options, &mut stats)?;
    }

    eprintln!("pcap: {}", pcap_path.display());
    eprintln!("packets: {}", stats.packets);
    eprintln!("udp payloads: {}", stats.udp_payloads);
    eprintln!("records: {}", stats.records);
    eprintln!("decoded records: {}", stats.decoded_records);
    eprintln!("incomplete payloads: {}", stats.incomplete_payloads);
    eprintln!("payloads with trailing bytes: {}", stats.overflowing_payloads);
    Ok(())
}

fn run_legacy_pcap<R: Read>(file: R, options: &Options, stats: &mut Stats) -> anyhow::Result<()> {
    let mut reader = pcap_parser::pcap::LegacyPcapReader::new(1 << 20, file)?;
    let mut linktype: Option<Linktype> = None;
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                let mut payload = None;
                match block {
                    PcapBlockOwned::LegacyHeader(h) => linktype = Some(h.network),
                    PcapBlockOwned::Legacy(b) => {
                        stats.packets += 1;
                        let lt = linktype.unwrap_or(Linktype(1));
                        payload = udp_payload_from_linktype(lt, b.data).map(<[u8]>::to_vec);
                    }
                    PcapBlockOwned::NG(_) => {}
                }
                reader.consume(offset);
                if let Some(payload) = payload {
                    process_udp_payload(&payload, options, stats)?;
                }
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete(_)) => {
                reader
                    .refill()
                    .map_err(|e| anyhow::anyhow!("pcap refill error: {:?}", e))?;
            }
            Err(e) => return Err(anyhow::anyhow!("pcap read error: {:?}", e)),
        }
    }
    Ok(())
}

fn run_pcapng<R: Read>(file: R, options: &Options, stats: &mut Stats) -> anyhow::Result<()> {
    let mut reader = pcap_parser::pcapng::PcapNGReader::new(1 << 20, file)?;
    let mut if_linktypes: Vec<Linktype> = Vec::new();
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                let mut payload = None;
                if let PcapBlockOwned::NG(b) = block {
                    match &b {
                        PcapNgBlock::InterfaceDescription(idb) => if_linktypes.push(idb.linktype),
                        PcapNgBlock::EnhancedPacket(epb) => {
                            stats.packets += 1;
                            let lt = if_linktypes.get(epb.if_id as usize).copied().unwrap_or(Linktype(1));
                            payload = udp_payload_from_linktype(lt, epb.packet_data()).map(<[u8]>::to_vec);
                        }
                        PcapNgBlock::SimplePacket(spb) => {
                            stats.packets += 1;
                            let lt = if_linktypes.first().copied().unwrap_or(Linktype(1));
                            payload = udp_payload_from_linktype(lt, spb.packet_data()).map(<[u8]>::to_vec);
                        }
                        _ => {}
                    }
                }
                reader.consume(offset);
                if let Some(payload) = payload {
                    process_udp_payload(&payload, options, stats)?;
                }
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete(_)) => {
                reader
                    .refill()
                    .map_err(|e| anyhow::anyhow!("pcapng refill error: {:?}", e))?;
            }
            Err(e) => return Err(anyhow::anyhow!("pcapng read error: {:?}", e)),
        }
    }
    Ok(())
}

/// Payload laid out as back-to-back length-prefixed records.
fn build_payload_tree(tree: &mut MessageTree, width: usize, size: usize) -> NodeId {
    let record = tree.new_length_prefixed("record", width, Endianness::Big);
    let payload = tree.new_sequence("payload", Some(record), None);
    tree.set_size(payload, Some(size));
    tree.set_auto_extend(payload, true);
    payload
}

fn process_udp_payload(payload: &[u8], options: &Options, stats: &mut Stats) -> anyhow::Result<()> {
    stats.udp_payloads += 1;
    let mut tree = MessageTree::new();
    let root = build_payload_tree(&mut tree, options.width, payload.len());
    tree.dissect_bytes(root, payload)
        .map_err(|e| anyhow::anyhow!("packet {}: {}", stats.packets, e))?;

    let node = tree.try_get(root)?;
    let records: Vec<NodeRef<'_>> = node
        .children()
        .filter(|c| c.static_type() == "LengthPrefixed")
        .collect();
    stats.records += records.len() as u64;
    stats.decoded_records += records.iter().filter(|r| r.is_decoded()).count() as u64;
    if records.last().map_or(false, |r| !r.is_decoded()) {
        stats.incomplete_payloads += 1;
    }
    if node.has_overflow() {
        stats.overflowing_payloads += 1;
    }

    let selected = options.frame_filter.map_or(true, |f| f == stats.packets);
    if options.verbose && selected {
        println!("packet {} ({} bytes)", stats.packets, payload.len());
        print!("{}", format_tree(&node));
    }
    Ok(())
}

const ETHERTYPE_IPV4: u16 = 0x0800;
const IPPROTO_UDP: u8 = 17;

/// UDP payload of a captured frame. Lengths come from the IPv4 and UDP headers, so
/// Ethernet padding never reaches the dissector.
fn udp_payload_from_linktype(linktype: Linktype, frame: &[u8]) -> Option<&[u8]> {
    let l3 = match linktype {
        Linktype::ETHERNET => ethernet_l3(frame)?,
        Linktype::RAW => frame,
        Linktype::LINUX_SLL => linux_sll_l3(frame)?,
        _ => return None,
    };
    ipv4_udp_payload(l3)
}

fn be16(bytes: &[u8], at: usize) -> Option<u16> {
    bytes.get(at..at + 2).map(BigEndian::read_u16)
}

fn ethernet_l3(frame: &[u8]) -> Option<&[u8]> {
    let mut at = 12;
    let mut ethertype = be16(frame, at)?;
    // skip 802.1Q / 802.1ad tags
    while matches!(ethertype, 0x8100 | 0x88a8) {
        at += 4;
        ethertype = be16(frame, at)?;
    }
    (ethertype == ETHERTYPE_IPV4).then(|| &frame[at + 2..])
}

fn linux_sll_l3(frame: &[u8]) -> Option<&[u8]> {
    (be16(frame, 14)? == ETHERTYPE_IPV4).then(|| &frame[16..])
}

fn ipv4_udp_payload(packet: &[u8]) -> Option<&[u8]> {
    let version_ihl = *packet.first()?;
    if version_ihl >> 4 != 4 {
        return None;
    }
    let header = usize::from(version_ihl & 0x0f) * 4;
    let total = usize::from(be16(packet, 2)?);
    if header < 20 || total < header || *packet.get(9)? != IPPROTO_UDP {
        return None;
    }
    let datagram = packet.get(header..total.min(packet.len()))?;
    let udp_len = usize::from(be16(datagram, 4)?);
    datagram.get(8..udp_len)
}
