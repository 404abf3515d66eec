// File: tests/audit_test.rs

use calico_wrapper::audit::{read_records, AuditRecorder, TransactionRecord};
use std::thread;
use tempfile::TempDir;

#[test]
fn test_concurrent_appends_stay_whole() -> Result<(), Box<dyn std::error::Error>> {
    const WRITERS: usize = 16;
    const RECORDS_PER_WRITER: usize = 25;

    let dir = TempDir::new()?;
    let path = dir.path().join("wrapper.log");

    let handles: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let recorder = AuditRecorder::new(&path);
            thread::spawn(move || {
                for n in 0..RECORDS_PER_WRITER {
                    let record = TransactionRecord {
                        environment: vec![format!("CNI_CONTAINERID=writer-{}-{}", writer, n); 8],
                        input: Some(serde_json::json!({ "name": "k8s-pod-network", "writer": writer })),
                        errors: vec!["x".repeat(512)],
                        ..Default::default()
                    };
                    recorder.record(&record).expect("append audit record");
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("writer thread panicked");
    }

    let records = read_records(&path)?;
    assert_eq!(records.len(), WRITERS * RECORDS_PER_WRITER);
    for record in &records {
        assert_eq!(record.environment.len(), 8);
        assert!(record.environment.iter().all(|e| e == &record.environment[0]));
        assert_eq!(record.errors[0].len(), 512);
    }

    Ok(())
}
