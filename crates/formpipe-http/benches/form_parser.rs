//! Parser throughput benchmarks.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use formpipe_http::{BytesSource, FormParser};

fn urlencoded_body(pairs: usize) -> Vec<u8> {
    let mut body = Vec::new();
    for i in 0..pairs {
        if i > 0 {
            body.push(b'&');
        }
        body.extend_from_slice(format!("key{i}=value+number+%2{}", i % 10).as_bytes());
    }
    body
}

fn multipart_body(fields: usize) -> Vec<u8> {
    let mut body = Vec::new();
    for i in 0..fields {
        body.extend_from_slice(b"--bench-boundary\r\n");
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"field{i}\"\r\n").as_bytes(),
        );
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(format!("value payload for field number {i}\r\n").as_bytes());
    }
    body.extend_from_slice(b"--bench-boundary--\r\n");
    body
}

fn bench_urlencoded(c: &mut Criterion) {
    let body = urlencoded_body(32);
    let parser = FormParser::from_content_type(Some("application/x-www-form-urlencoded"));
    c.bench_function("urlencoded_32_pairs", |b| {
        b.iter(|| {
            let mut source = BytesSource::new(black_box(body.clone()));
            let form = parser.parse(&mut source).unwrap();
            black_box(form.len())
        });
    });
}

fn bench_multipart(c: &mut Criterion) {
    let body = multipart_body(16);
    let parser =
        FormParser::from_content_type(Some("multipart/form-data; boundary=bench-boundary"));
    c.bench_function("multipart_16_fields", |b| {
        b.iter(|| {
            let mut source = BytesSource::new(black_box(body.clone()));
            let form = parser.parse(&mut source).unwrap();
            black_box(form.len())
        });
    });
}

criterion_group!(benches, bench_urlencoded, bench_multipart);
criterion_main!(benches);
