//! The byte-level predictor and even/odd interleave shared by RLE, ZIP and ZIPS.

/// Integrate over all differences to the previous value in order to reconstruct sample values.
pub fn differences_to_samples(buffer: &mut [u8]) {
    for index in 1..buffer.len() {
        buffer[index] = (buffer[index - 1] as i32 + buffer[index] as i32 - 128) as u8;
    }
}

/// Derive over all values in order to produce differences to the previous value.
pub fn samples_to_differences(buffer: &mut [u8]) {
    for index in (1..buffer.len()).rev() {
        buffer[index] = (buffer[index] as i32 - buffer[index - 1] as i32 + 128) as u8;
    }
}

/// Interleave the bytes such that the second half of the array is each other byte.
pub fn interleave_byte_blocks(separated: &mut [u8]) {
    let mut interleaved = Vec::with_capacity(separated.len());
    let (first_half, second_half) = separated.split_at((separated.len() + 1) / 2);

    let mut second_half_index = 0;
    let mut first_half_index = 0;

    loop {
        if interleaved.len() < separated.len() {
            interleaved.push(first_half[first_half_index]);
            first_half_index += 1;
        } else { break; }

        if interleaved.len() < separated.len() {
            interleaved.push(second_half[second_half_index]);
            second_half_index += 1;
        } else { break; }
    }

    separated.copy_from_slice(interleaved.as_slice())
}

/// Separate the bytes such that the second half contains each other byte.
pub fn separate_bytes_fragments(source: &mut [u8]) {
    let mut first_half = Vec::with_capacity(source.len() / 2);
    let mut second_half = Vec::with_capacity(source.len() / 2);
    let mut interleaved_index = 0;

    loop {
        if interleaved_index < source.len() {
            first_half.push(source[interleaved_index]);
            interleaved_index += 1;
        } else { break; }

        if interleaved_index < source.len() {
            second_half.push(source[interleaved_index]);
            interleaved_index += 1;
        } else { break; }
    }

    let mut result = first_half;
    result.append(&mut second_half);
    source.copy_from_slice(result.as_slice());
}

#[cfg(test)]
mod test {
    #[test]
    fn roundtrip_interleave() {
        let source = vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        let mut modified = source.clone();

        super::separate_bytes_fragments(&mut modified);
        super::interleave_byte_blocks(&mut modified);

        assert_eq!(source, modified);
    }

    #[test]
    fn roundtrip_derive() {
        let source = vec![0, 1, 2, 7, 4, 5, 6, 7, 13, 9, 10];
        let mut modified = source.clone();

        super::samples_to_differences(&mut modified);
        super::differences_to_samples(&mut modified);

        assert_eq!(source, modified);
    }
}
