use crate::error::{ProbeError, ProbeOutcome};
use crate::state::SnmpRow;
use serde::{Deserialize, Serialize};
use snmp2::{AsyncSession, Oid, Pdu, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time;
use tracing::{debug, warn};

const NO_RESPONSE: &str = "No SNMP response received before timeout";
const NO_SUCH_NAME: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SnmpVersion {
    V1,
    V2c,
}

impl SnmpVersion {
    /// Maps the `0 = v1, 1 = v2c` message-processing model numbering.
    pub fn from_model(model: u8) -> Option<Self> {
        match model {
            0 => Some(Self::V1),
            1 => Some(Self::V2c),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnmpTarget {
    pub host: String,
    pub port: u16,
    pub version: SnmpVersion,
    pub community: String,
    pub timeout: Duration,
}

impl SnmpTarget {
    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Fetches scalar OIDs and returns them keyed by the OID text they were asked with.
pub async fn get(target: &SnmpTarget, oids: &[&str]) -> ProbeOutcome<HashMap<String, String>> {
    let parsed = oids
        .iter()
        .map(|oid| parse_oid(oid))
        .collect::<ProbeOutcome<Vec<_>>>()?;
    let mut session = open(target).await?;

    let mut result = HashMap::with_capacity(oids.len());
    for (name, oid) in oids.iter().zip(&parsed) {
        let pdu = exchange(target, session.get(oid)).await?;
        check_status(&pdu)?;
        let (_, value) = pdu
            .varbinds
            .into_iter()
            .next()
            .ok_or_else(|| ProbeError::protocol(format!("empty SNMP response for {name}")))?;
        if is_absent(&value) {
            return Err(ProbeError::protocol(format!("No Such Object currently exists at {name}")));
        }
        result.insert(name.to_string(), render(&value));
    }
    debug!(target = %target.address(), count = result.len(), "snmp get done");
    Ok(result)
}

/// Walks the given table columns side by side and rebuilds one row per entity.
///
/// Each round issues one GET-NEXT per column, so the varbind stream comes back
/// row-major in column order. The walk stops at the first column that leaves
/// its subtree, and fails if an agent answers without moving past the cursor.
pub async fn table(target: &SnmpTarget, columns: &[&str]) -> ProbeOutcome<Vec<SnmpRow>> {
    let roots = columns
        .iter()
        .map(|oid| parse_oid(oid))
        .collect::<ProbeOutcome<Vec<_>>>()?;
    let mut session = open(target).await?;

    let mut cursors = roots.clone();
    let mut stream = Vec::new();
    'walk: loop {
        let mut round = Vec::with_capacity(roots.len());
        for (root, cursor) in roots.iter().zip(cursors.iter_mut()) {
            match next(target, &mut session, cursor).await? {
                Some((oid, value)) if oid.starts_with(root) => {
                    if arcs(&oid) <= arcs(cursor) {
                        warn!(target = %target.address(), oid = %oid, "snmp agent repeated an OID");
                        return Err(ProbeError::protocol("OIDs are not increasing"));
                    }
                    round.push(value);
                    *cursor = oid;
                }
                _ => break 'walk,
            }
        }
        stream.extend(round);
    }

    let rows = rebuild_rows(columns, stream);
    debug!(target = %target.address(), rows = rows.len(), "snmp walk done");
    Ok(rows)
}

/// Splits a flat, row-major value stream into rows of `columns.len()` values.
///
/// The stream has no row delimiter; the column cursor alone decides where a row
/// ends. A trailing incomplete row is dropped.
pub fn rebuild_rows<I>(columns: &[&str], values: I) -> Vec<SnmpRow>
where
    I: IntoIterator<Item = String>,
{
    let Some(last) = columns.len().checked_sub(1) else {
        return Vec::new();
    };

    let mut table = Vec::new();
    let mut row = SnmpRow::new();
    let mut cursor = 0;
    for value in values {
        row.push(columns[cursor], value);
        if cursor == last {
            table.push(std::mem::take(&mut row));
            cursor = 0;
        } else {
            cursor += 1;
        }
    }
    table
}

async fn open(target: &SnmpTarget) -> ProbeOutcome<AsyncSession> {
    let address = target.address();
    let community = target.community.as_bytes();
    let session = match target.version {
        SnmpVersion::V1 => AsyncSession::new_v1(address.as_str(), community, 0).await,
        SnmpVersion::V2c => AsyncSession::new_v2c(address.as_str(), community, 0).await,
    };
    session.map_err(|err| {
        warn!(target = %address, error = %err, "snmp session failed");
        ProbeError::transport(format!("{address}: {err}"))
    })
}

async fn exchange<'a, F>(target: &SnmpTarget, request: F) -> ProbeOutcome<Pdu<'a>>
where
    F: std::future::Future<Output = std::result::Result<Pdu<'a>, snmp2::Error>>,
{
    match time::timeout(target.timeout, request).await {
        Ok(Ok(pdu)) => Ok(pdu),
        Ok(Err(err)) => {
            warn!(target = %target.address(), error = %err, "snmp request failed");
            Err(ProbeError::transport(err.to_string()))
        }
        Err(_elapsed) => {
            warn!(target = %target.address(), "snmp request timeout");
            Err(ProbeError::transport(NO_RESPONSE))
        }
    }
}

/// One GET-NEXT step; `None` once the agent reports the end of the MIB.
async fn next(
    target: &SnmpTarget,
    session: &mut AsyncSession,
    cursor: &Oid<'_>,
) -> ProbeOutcome<Option<(Oid<'static>, String)>> {
    let pdu = exchange(target, session.getnext(cursor)).await?;
    // v1 agents answer past the last object with noSuchName instead of endOfMibView.
    if target.version == SnmpVersion::V1 && pdu.error_status == NO_SUCH_NAME {
        return Ok(None);
    }
    check_status(&pdu)?;

    Ok(pdu
        .varbinds
        .into_iter()
        .next()
        .filter(|(_, value)| !is_absent(value))
        .map(|(oid, value)| (oid.to_owned(), render(&value))))
}

/// Numeric arcs, which order OIDs lexicographically.
fn arcs(oid: &Oid<'_>) -> Vec<u64> {
    oid.iter().map(|arcs| arcs.collect()).unwrap_or_default()
}

fn check_status(pdu: &Pdu<'_>) -> ProbeOutcome<()> {
    match pdu.error_status {
        0 => Ok(()),
        status => Err(ProbeError::protocol(error_status_name(status))),
    }
}

fn is_absent(value: &Value<'_>) -> bool {
    matches!(
        value,
        Value::EndOfMibView | Value::NoSuchObject | Value::NoSuchInstance
    )
}

pub fn parse_oid(s: &str) -> ProbeOutcome<Oid<'static>> {
    let parts = s
        .trim()
        .split('.')
        .filter(|p| !p.is_empty())
        .map(|p| p.parse::<u64>())
        .collect::<Result<Vec<u64>, _>>()
        .map_err(|_| ProbeError::config(format!("invalid OID: {s}")))?;
    Oid::from(&parts).map_err(|err| ProbeError::config(format!("invalid OID {s}: {err:?}")))
}

/// Renders a value the way an operator reads it: text for strings, plain numbers otherwise.
pub fn render(value: &Value<'_>) -> String {
    match value {
        Value::Integer(v) => v.to_string(),
        Value::OctetString(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        Value::ObjectIdentifier(oid) => oid.to_string(),
        Value::IpAddress([a, b, c, d]) => format!("{a}.{b}.{c}.{d}"),
        Value::Counter32(v) | Value::Unsigned32(v) | Value::Timeticks(v) => v.to_string(),
        Value::Counter64(v) => v.to_string(),
        other => format!("{other:?}"),
    }
}

pub fn error_status_name(status: u32) -> String {
    let name = match status {
        0 => "noError",
        1 => "tooBig",
        2 => "noSuchName",
        3 => "badValue",
        4 => "readOnly",
        5 => "genErr",
        6 => "noAccess",
        7 => "wrongType",
        8 => "wrongLength",
        9 => "wrongEncoding",
        10 => "wrongValue",
        11 => "noCreation",
        12 => "inconsistentValue",
        13 => "resourceUnavailable",
        14 => "commitFailed",
        15 => "undoFailed",
        16 => "authorizationError",
        17 => "notWritable",
        18 => "inconsistentName",
        other => return format!("SNMP error-status {other}"),
    };
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use snmp2::{MessageType, Varbinds};
    use std::collections::BTreeMap;
    use std::ops::Bound;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::net::UdpSocket;

    const DESCR: &str = "1.3.6.1.2.1.25.2.3.1.3";
    const UNITS: &str = "1.3.6.1.2.1.25.2.3.1.4";
    const SIZE: &str = "1.3.6.1.2.1.25.2.3.1.5";

    fn stream(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn rebuilds_rows_from_row_major_stream() {
        let columns = [DESCR, UNITS, SIZE];
        let rows = rebuild_rows(&columns, stream(&["/", "4096", "1000", "/data", "4096", "5000"]));

        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert_eq!(row.columns().collect::<Vec<_>>(), columns.to_vec());
        }
        assert_eq!(rows[0].get(DESCR), Some("/"));
        assert_eq!(rows[1].get(DESCR), Some("/data"));
        assert_eq!(rows[1].get(SIZE), Some("5000"));
    }

    #[test]
    fn row_count_is_stream_length_over_column_count() {
        let columns = ["1.1", "1.2"];
        for n in 0..6 {
            let values: Vec<String> = (0..n * 2).map(|i| i.to_string()).collect();
            assert_eq!(rebuild_rows(&columns, values).len(), n);
        }
    }

    #[test]
    fn incomplete_trailing_row_is_discarded() {
        let rows = rebuild_rows(&[DESCR, UNITS, SIZE], stream(&["/", "4096", "1000", "/data"]));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(DESCR), Some("/"));
    }

    #[test]
    fn single_column_makes_one_row_per_value() {
        let rows = rebuild_rows(&["1.3.6.1.2.1.25.3.3.1.2"], stream(&["5", "7", "9"]));
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].get("1.3.6.1.2.1.25.3.3.1.2"), Some("9"));
    }

    #[test]
    fn no_columns_yield_no_rows() {
        assert!(rebuild_rows(&[], stream(&["x"])).is_empty());
    }

    #[test]
    fn parses_numeric_oids() {
        assert!(parse_oid("1.3.6.1.2.1.25.1.1.0").is_ok());
        assert!(parse_oid(".1.3.6.1").is_ok());
        assert!(matches!(parse_oid("iso.org.dod"), Err(ProbeError::Config(_))));
    }

    #[test]
    fn renders_common_values() {
        assert_eq!(render(&Value::Integer(-4)), "-4");
        assert_eq!(render(&Value::OctetString(b"/var")), "/var");
        assert_eq!(render(&Value::Timeticks(8_640_000)), "8640000");
        assert_eq!(render(&Value::IpAddress([10, 0, 0, 1])), "10.0.0.1");
    }

    #[test]
    fn names_error_statuses() {
        assert_eq!(error_status_name(2), "noSuchName");
        assert_eq!(error_status_name(5), "genErr");
        assert_eq!(error_status_name(99), "SNMP error-status 99");
    }

    #[test]
    fn maps_version_models() {
        assert_eq!(SnmpVersion::from_model(0), Some(SnmpVersion::V1));
        assert_eq!(SnmpVersion::from_model(1), Some(SnmpVersion::V2c));
        assert_eq!(SnmpVersion::from_model(3), None);
    }

    const FRW_ID: &str = "1.3.6.1.2.1.25.3.3.1.1";
    const LOAD: &str = "1.3.6.1.2.1.25.3.3.1.2";

    enum Reply {
        Next(Vec<u64>, u8),
        End,
        Status(u32),
    }

    fn oid_arcs(s: &str) -> Vec<u64> {
        s.split('.').map(|p| p.parse().expect("arc")).collect()
    }

    fn child(column: &str, index: u64) -> Vec<u64> {
        let mut arcs = oid_arcs(column);
        arcs.push(index);
        arcs
    }

    fn tlv(tag: u8, body: &[u8]) -> Vec<u8> {
        assert!(body.len() < 128);
        let mut out = vec![tag, body.len() as u8];
        out.extend_from_slice(body);
        out
    }

    fn varbind(arcs: &[u64], value: Vec<u8>) -> Vec<u8> {
        let oid = Oid::from(arcs).expect("oid");
        let mut body = tlv(0x06, oid.as_bytes());
        body.extend(value);
        tlv(0x30, &body)
    }

    /// GET-NEXT over a small in-memory MIB.
    fn mib(entries: &[(Vec<u64>, u8)]) -> impl Fn(&[u64]) -> Reply + Send + 'static {
        let mib: BTreeMap<Vec<u64>, u8> = entries.iter().cloned().collect();
        move |asked| {
            match mib
                .range::<[u64], _>((Bound::Excluded(asked), Bound::Unbounded))
                .next()
            {
                Some((oid, value)) => Reply::Next(oid.clone(), *value),
                None => Reply::End,
            }
        }
    }

    fn processors() -> Vec<(Vec<u64>, u8)> {
        (1..=3)
            .flat_map(|i| [(child(FRW_ID, i), 10 + i as u8), (child(LOAD, i), 4 + i as u8)])
            .collect()
    }

    /// A UDP agent answering every request through `answer`; counts requests served.
    async fn agent<F>(version: SnmpVersion, answer: F) -> (SnmpTarget, Arc<AtomicUsize>)
    where
        F: Fn(&[u64]) -> Reply + Send + 'static,
    {
        let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind");
        let port = socket.local_addr().expect("local addr").port();
        let served = Arc::new(AtomicUsize::new(0));
        let counter = served.clone();

        tokio::spawn(async move {
            let mut buf = [0_u8; 1500];
            while let Ok((n, peer)) = socket.recv_from(&mut buf).await {
                counter.fetch_add(1, Ordering::SeqCst);
                let bytes = {
                    let request = Pdu::from_bytes(&buf[..n]).expect("request");
                    let v1 = request.version().expect("version") == snmp2::Version::V1;
                    let (asked, _) = request.varbinds.clone().next().expect("varbind");
                    let asked: Vec<u64> = asked.iter().expect("arcs").collect();

                    let (status, encoded) = match answer(asked.as_slice()) {
                        Reply::Next(oid, value) => (0, varbind(&oid, tlv(0x02, &[value]))),
                        Reply::End if v1 => (NO_SUCH_NAME, varbind(&asked, tlv(0x05, &[]))),
                        Reply::End => (0, varbind(&asked, tlv(0x82, &[]))),
                        Reply::Status(status) => (status, varbind(&asked, tlv(0x05, &[]))),
                    };
                    let mut response = request;
                    response.message_type = MessageType::Response;
                    response.error_status = status;
                    response.error_index = u32::from(status != 0);
                    response.varbinds = Varbinds::from_bytes(&encoded);
                    response.to_bytes().expect("encode")
                };
                if socket.send_to(&bytes, peer).await.is_err() {
                    break;
                }
            }
        });

        let target = SnmpTarget {
            host: "127.0.0.1".to_string(),
            port,
            version,
            community: "public".to_string(),
            timeout: Duration::from_secs(1),
        };
        (target, served)
    }

    #[tokio::test]
    async fn walk_rebuilds_rows_over_several_rounds() {
        let (target, served) = agent(SnmpVersion::V2c, mib(&processors())).await;

        let rows = table(&target, &[FRW_ID, LOAD]).await.expect("walk");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].get(FRW_ID), Some("11"));
        assert_eq!(rows[0].get(LOAD), Some("5"));
        assert_eq!(rows[2].get(FRW_ID), Some("13"));
        assert_eq!(rows[2].get(LOAD), Some("7"));
        // three full rounds, then the first column steps into the load column
        assert_eq!(served.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn walk_stops_when_a_column_leaves_its_subtree() {
        let mut entries = processors();
        entries.push((oid_arcs("1.3.6.1.2.1.25.3.4.1.1.1"), 99));
        let (target, _) = agent(SnmpVersion::V2c, mib(&entries)).await;

        let rows = table(&target, &[LOAD]).await.expect("walk");
        let loads: Vec<_> = rows.iter().filter_map(|row| row.get(LOAD)).collect();
        assert_eq!(loads, vec!["5", "6", "7"]);
    }

    #[tokio::test]
    async fn end_of_mib_view_ends_the_walk() {
        let entries: Vec<_> = (1..=2).map(|i| (child(LOAD, i), 20 + i as u8)).collect();
        let (target, served) = agent(SnmpVersion::V2c, mib(&entries)).await;

        let rows = table(&target, &[LOAD]).await.expect("walk");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get(LOAD), Some("22"));
        assert_eq!(served.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn v1_no_such_name_ends_the_walk() {
        let entries: Vec<_> = (1..=2).map(|i| (child(LOAD, i), 30 + i as u8)).collect();
        let (target, _) = agent(SnmpVersion::V1, mib(&entries)).await;

        let rows = table(&target, &[LOAD]).await.expect("walk");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get(LOAD), Some("31"));
    }

    #[tokio::test]
    async fn error_status_mid_walk_fails_the_whole_table() {
        let walk = mib(&processors());
        let failing = child(LOAD, 1);
        let (target, _) = agent(SnmpVersion::V2c, move |asked| {
            if asked == failing.as_slice() {
                Reply::Status(5)
            } else {
                walk(asked)
            }
        })
        .await;

        let err = table(&target, &[FRW_ID, LOAD]).await.unwrap_err();
        assert_eq!(err, ProbeError::protocol("genErr"));
    }

    #[tokio::test]
    async fn repeated_oid_fails_instead_of_looping() {
        let frw = oid_arcs(FRW_ID);
        let (target, served) = agent(SnmpVersion::V2c, move |asked| {
            if asked.starts_with(&frw) {
                Reply::Next(child(FRW_ID, 1), 11)
            } else {
                Reply::Next(child(LOAD, 1), 5)
            }
        })
        .await;

        let outcome = time::timeout(Duration::from_secs(3), table(&target, &[FRW_ID, LOAD]))
            .await
            .expect("walk returned");
        assert_eq!(outcome.unwrap_err(), ProbeError::protocol("OIDs are not increasing"));
        assert_eq!(served.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn silent_agent_times_out() {
        let agent = UdpSocket::bind("127.0.0.1:0").await.expect("bind");
        let target = SnmpTarget {
            host: "127.0.0.1".to_string(),
            port: agent.local_addr().expect("local addr").port(),
            version: SnmpVersion::V2c,
            community: "public".to_string(),
            timeout: Duration::from_millis(200),
        };

        let err = get(&target, &["1.3.6.1.2.1.25.1.1.0"]).await.unwrap_err();
        assert_eq!(err, ProbeError::transport(NO_RESPONSE));

        let err = table(&target, &[DESCR, UNITS]).await.unwrap_err();
        assert_eq!(err, ProbeError::transport(NO_RESPONSE));
    }
}
