//! Read-only S3 byte store (spec §4.4): issues signed HTTP range-GET
//! requests against an S3-compatible bucket. Write/truncate/lock are
//! refused — this store exists for readers against an archive a writer
//! elsewhere owns.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::cache::Address;
use crate::store::ByteStore;
use crate::Error;

type HmacSha256 = Hmac<Sha256>;

pub struct Ros3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
}

pub struct Ros3Store {
    bucket_host: String,
    object_key: String,
    creds: Ros3Credentials,
    client: reqwest::blocking::Client,
}

impl Ros3Store {
    pub fn new(bucket_host: String, object_key: String, creds: Ros3Credentials) -> Self {
        Self { bucket_host, object_key, creds, client: reqwest::blocking::Client::new() }
    }

    fn sign_and_get(&self, off: u64, len: u64) -> crate::Result<Vec<u8>> {
        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();

        let range_header = format!("bytes={}-{}", off, off + len.max(1) - 1);
        let url = format!("https://{}/{}", self.bucket_host, self.object_key);
        let canonical_uri = format!("/{}", self.object_key);

        let payload_hash = hex::encode(Sha256::digest(b""));
        let canonical_headers = format!(
            "host:{}\nrange:{}\nx-amz-content-sha256:{}\nx-amz-date:{}\n",
            self.bucket_host, range_header, payload_hash, amz_date
        );
        let signed_headers = "host;range;x-amz-content-sha256;x-amz-date";
        let canonical_request = format!(
            "GET\n{}\n\n{}\n{}\n{}",
            canonical_uri, canonical_headers, signed_headers, payload_hash
        );

        let scope = format!("{}/{}/s3/aws4_request", date_stamp, self.creds.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signing_key = self.derive_signing_key(&date_stamp);
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.creds.access_key_id, scope, signed_headers, signature
        );

        let resp = self
            .client
            .get(&url)
            .header("x-amz-date", amz_date)
            .header("x-amz-content-sha256", payload_hash)
            .header("range", range_header)
            .header("authorization", authorization)
            .send()
            .map_err(|e| Error::ReadFailed { offset: off, len, detail: e.to_string() })?;

        if !resp.status().is_success() {
            return Err(Error::ReadFailed {
                offset: off,
                len,
                detail: format!("HTTP {}", resp.status()),
            });
        }

        let bytes = resp
            .bytes()
            .map_err(|e| Error::ReadFailed { offset: off, len, detail: e.to_string() })?;
        Ok(bytes.to_vec())
    }

    fn derive_signing_key(&self, date_stamp: &str) -> Vec<u8> {
        let k_date = hmac_sha256(
            format!("AWS4{}", self.creds.secret_access_key).as_bytes(),
            date_stamp.as_bytes(),
        );
        let k_region = hmac_sha256(&k_date, self.creds.region.as_bytes());
        let k_service = hmac_sha256(&k_region, b"s3");
        hmac_sha256(&k_service, b"aws4_request")
    }
}

fn hmac_sha256(key: &[u8], msg: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(msg);
    mac.finalize().into_bytes().to_vec()
}

impl ByteStore for Ros3Store {
    fn read(&self, off: u64, len: u64) -> crate::Result<Vec<u8>> {
        let body = self.sign_and_get(off, len)?;
        if (body.len() as u64) < len {
            return Err(Error::Truncated { offset: off, expected: len, got: body.len() as u64 });
        }
        Ok(body)
    }

    fn write(&self, off: u64, data: &[u8]) -> crate::Result<()> {
        Err(Error::WriteFailed {
            offset: off,
            len: data.len() as u64,
            detail: "ros3 store is read-only".into(),
        })
    }

    fn get_eoa(&self) -> crate::Result<Address> {
        let resp = self
            .client
            .head(format!("https://{}/{}", self.bucket_host, self.object_key))
            .send()
            .map_err(|e| Error::ReadFailed { offset: 0, len: 0, detail: e.to_string() })?;
        let len = resp
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        Ok(Address::new(len))
    }

    fn set_eoa(&self, _addr: Address) -> crate::Result<()> {
        Err(Error::WriteFailed { offset: 0, len: 0, detail: "ros3 store is read-only".into() })
    }

    fn truncate(&self) -> crate::Result<()> {
        Err(Error::WriteFailed { offset: 0, len: 0, detail: "ros3 store is read-only".into() })
    }

    fn lock(&self, _exclusive: bool) -> crate::Result<()> {
        Ok(())
    }

    fn unlock(&self) -> crate::Result<()> {
        Ok(())
    }
}
