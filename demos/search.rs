use bookbuddy_api::{GoogleBooksClient, SearchQuery, VolumeList};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let query = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "intitle:dune".to_owned());

    let books = GoogleBooksClient::from_env()?;

    let result = match books.search(&SearchQuery::new(query).page(0, 10)).await.into_result() {
        Ok(result) => result,
        Err(failure) => {
            eprintln!("{}", failure.user_message);
            return Err(failure.into());
        }
    };

    let list = VolumeList::from_payload(&result.data)?;
    println!("{} result(s)", list.total_items);
    for volume in list.items {
        let info = volume.volume_info;
        println!(
            "{} - {} [{}]",
            info.title,
            info.authors.join(", "),
            info.isbn().unwrap_or("no isbn")
        );
    }

    Ok(())
}
