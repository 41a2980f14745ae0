/*
 *  tests/lcd_integration.rs
 *
 *  Integration tests for the LCD worker, driven through the mock pin bank
 *
 *  LcdRelay - two rows, sixteen cells
 *  (c) 2020-26 Stuart Hunter
 */

use std::time::Duration;

use lcdrelay::feed::Feed;
use lcdrelay::lcd::{Lcd, LcdState, Row, Timing, LCD_LINE_1, LCD_LINE_2};
use lcdrelay::pins::{MockBank, MockDelay, PinEvent, PinRole, Pinout, Recorder, Transfer};

fn open(recorder: &Recorder) -> Lcd {
    let bank = MockBank::open(recorder).unwrap();
    Lcd::open(bank, recorder.pinout(), Timing::default(), MockDelay::new(recorder)).unwrap()
}

fn command(byte: u8) -> Transfer {
    Transfer { rs: false, byte }
}

/// Expected bus traffic for writing `row` on the line at `address`
fn row_group(address: u8, row: &Row) -> Vec<Transfer> {
    let mut group = vec![command(address)];
    group.extend(row.as_bytes().iter().map(|&byte| Transfer { rs: true, byte }));
    group
}

#[tokio::test]
async fn test_end_to_end_hello_world() {
    let pinout = Pinout::default();
    let recorder = Recorder::new(pinout);
    let lcd = open(&recorder);

    let mark = recorder.mark();
    lcd.show("Hello\nWorld").await;
    lcd.flush().await;

    let rows = lcd.rows();
    assert_eq!(rows[0].unwrap(), "Hello           ");
    assert_eq!(rows[1].unwrap(), "World           ");

    let mut expected = row_group(LCD_LINE_1, &Row::fit("Hello"));
    expected.extend(row_group(LCD_LINE_2, &Row::fit("World")));
    assert_eq!(recorder.transfers_since(mark), expected);

    // identical text: nothing moves on the bus
    let mark = recorder.mark();
    lcd.show("Hello\nWorld").await;
    lcd.flush().await;
    assert_eq!(recorder.pin_writes_since(mark), 0);

    let mark = recorder.mark();
    lcd.close().await;
    assert_eq!(lcd.state(), LcdState::Closed);

    let mut expected = row_group(LCD_LINE_1, &Row::blank());
    expected.extend(row_group(LCD_LINE_2, &Row::blank()));
    expected.push(command(0x01));
    expected.push(command(0x0C));
    assert_eq!(recorder.transfers_since(mark), expected);

    assert!(recorder.delays_since(mark).contains(&1_000_000_000));
    for role in PinRole::ALL {
        assert_eq!(recorder.level(role), Some(false), "{} not parked low", role);
    }
    assert_eq!(recorder.events().last(), Some(&PinEvent::Release));
    assert!(!recorder.is_claimed());
}

#[tokio::test]
async fn test_overlong_row_truncated() {
    let recorder = Recorder::new(Pinout::default());
    let lcd = open(&recorder);

    let mark = recorder.mark();
    lcd.show("This line is far too long for the panel").await;
    lcd.flush().await;

    let transfers = recorder.transfers_since(mark);
    assert_eq!(transfers, row_group(LCD_LINE_1, &Row::fit("This line is far")));
    assert_eq!(lcd.rows()[0].unwrap(), "This line is far");
    lcd.close().await;
}

#[tokio::test]
async fn test_rs_constant_across_nibble_pairs() {
    let recorder = Recorder::new(Pinout::default());
    let lcd = open(&recorder);

    let mark = recorder.mark();
    lcd.show("~}|{zyx\n!\"#$%&'").await;
    lcd.flush().await;

    let latches = recorder.latches_since(mark);
    assert_eq!(latches.len() % 2, 0);
    for pair in latches.chunks_exact(2) {
        assert_eq!(pair[0].rs, pair[1].rs);
    }
    lcd.close().await;
}

#[tokio::test]
async fn test_show_after_close_is_silent() {
    let recorder = Recorder::new(Pinout::default());
    let lcd = open(&recorder);
    lcd.close().await;

    let mark = recorder.mark();
    lcd.show("too late").await;
    lcd.close().await;
    assert!(recorder.events_since(mark).is_empty());
    assert_eq!(recorder.release_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_never_interleave() {
    let recorder = Recorder::new(Pinout::default());
    let lcd = open(&recorder);
    let mark = recorder.mark();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let lcd = lcd.clone();
        tasks.push(tokio::spawn(async move {
            for round in 0..5 {
                lcd.show(format!("caller {}\nround {}", i, round)).await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    lcd.flush().await;

    let transfers = recorder.transfers_since(mark);
    assert!(!transfers.is_empty());
    assert_eq!(transfers.len() % 17, 0);
    for group in transfers.chunks_exact(17) {
        assert!(group[0] == command(LCD_LINE_1) || group[0] == command(LCD_LINE_2));
        assert!(group[1..].iter().all(|t| t.rs));

        let text: String = group[1..].iter().map(|t| t.byte as char).collect();
        let prefix = if group[0].byte == LCD_LINE_1 { "caller " } else { "round " };
        assert!(text.starts_with(prefix), "interleaved row {:?}", text);
    }
    lcd.close().await;
}

#[tokio::test]
async fn test_second_open_on_held_bank_fails() {
    let recorder = Recorder::new(Pinout::default());
    let lcd = open(&recorder);

    assert!(MockBank::open(&recorder).is_err());
    lcd.close().await;
    assert!(MockBank::open(&recorder).is_ok());
}

#[tokio::test]
async fn test_feed_forwards_datagrams() {
    let recorder = Recorder::new(Pinout::default());
    let lcd = open(&recorder);

    let feed = Feed::bind("127.0.0.1:0".parse().unwrap(), Duration::ZERO).await.unwrap();
    let addr = feed.local_addr().unwrap();
    let runner = tokio::spawn(feed.run(lcd.clone()));

    let sender = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    sender.send_to(br#"{"line1":"cpu 12%","line2":"up 3d"}"#, addr).await.unwrap();

    let shown = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            lcd.flush().await;
            if lcd.rows()[1].is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(shown.is_ok(), "datagram never reached the panel");
    assert_eq!(lcd.rows()[0].unwrap(), "cpu 12%         ");
    assert_eq!(lcd.rows()[1].unwrap(), "up 3d           ");

    runner.abort();
    lcd.close().await;
}
