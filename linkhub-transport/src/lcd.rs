//! LCD report framing for iCUE LINK AIO caps
//!
//! Images are streamed as 1024-byte output reports:
//! `02 05 01 <last> <chunk> 00 <len_lo> <len_hi>` followed by up to 1016
//! bytes of image data, zero padded.

/// LCD output report size
pub const LCD_REPORT_SIZE: usize = 1024;
/// Header bytes in front of the image data
pub const LCD_HEADER_SIZE: usize = 8;
/// Image bytes carried per report
pub const LCD_CHUNK_SIZE: usize = LCD_REPORT_SIZE - LCD_HEADER_SIZE;

const REPORT_ID: u8 = 0x02;
const COMMAND: u8 = 0x05;
const SUBCOMMAND: u8 = 0x01;

/// Split an encoded image into framed LCD reports.
///
/// An empty buffer still yields a single terminating report so the
/// panel sees a complete (blank) frame.
pub fn lcd_reports(image: &[u8]) -> Vec<Vec<u8>> {
    let total = image.len().div_ceil(LCD_CHUNK_SIZE).max(1);
    (0..total)
        .map(|index| {
            let start = index * LCD_CHUNK_SIZE;
            let end = (start + LCD_CHUNK_SIZE).min(image.len());
            let body = if start < end { &image[start..end] } else { &[][..] };
            let len = body.len() as u16;

            let mut report = vec![0u8; LCD_REPORT_SIZE];
            report[0] = REPORT_ID;
            report[1] = COMMAND;
            report[2] = SUBCOMMAND;
            report[3] = u8::from(index + 1 == total);
            report[4] = index as u8;
            report[5] = 0x00;
            report[6..8].copy_from_slice(&len.to_le_bytes());
            report[LCD_HEADER_SIZE..LCD_HEADER_SIZE + body.len()].copy_from_slice(body);
            report
        })
        .collect()
}
